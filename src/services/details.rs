// src/services/details.rs

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ClinicError, Validator};
use crate::{
    clock::Clock,
    models::{
        AnalysisRequest, Appointment, AppointmentDetails, CaseDescription, MedicamentLink,
        PaymentMethod, PrescriptionLine,
    },
    store::{AppointmentStore, StoreError},
};

const LINK_TEXT_MAX: usize = 50;

pub async fn toggle_insurance<S>(
    store: &S,
    clock: &dyn Clock,
    appointment_id: i64,
) -> Result<Appointment, ClinicError>
where
    S: AppointmentStore + ?Sized,
{
    let appointment = store
        .toggle_insurance(appointment_id, clock.now())
        .await?
        .ok_or_else(|| ClinicError::not_found("appointment", appointment_id))?;
    info!(
        appointment_id,
        covered = appointment.has_insurance_coverage,
        "insurance coverage toggled"
    );
    Ok(appointment)
}

/// Converts a decimal price to cents, rejecting negatives and non-numbers.
pub fn price_to_cents(price: f64) -> Result<i64, ClinicError> {
    if !price.is_finite() {
        return Err(ClinicError::invalid("price", "price must be a number"));
    }
    if price < 0.0 {
        return Err(ClinicError::invalid("price", "price must be at least 0"));
    }
    Ok((price * 100.0).round() as i64)
}

/// Accepts the canonical keys and the legacy front-desk spellings.
pub fn parse_payment_method(raw: &str) -> Result<PaymentMethod, ClinicError> {
    PaymentMethod::from_legacy(raw).ok_or_else(|| {
        ClinicError::invalid(
            "payment_method",
            "payment_method must be one of cash, card, check, insurance",
        )
    })
}

/// Sets the price and, when given, how it was settled. Without a method the
/// recorded one is kept.
pub async fn update_price<S>(
    store: &S,
    clock: &dyn Clock,
    appointment_id: i64,
    price: f64,
    payment_method: Option<&str>,
) -> Result<Appointment, ClinicError>
where
    S: AppointmentStore + ?Sized,
{
    let cents = price_to_cents(price)?;
    let method = payment_method.map(parse_payment_method).transpose()?;
    let appointment = store
        .update_payment(appointment_id, cents, method, clock.now())
        .await?
        .ok_or_else(|| ClinicError::not_found("appointment", appointment_id))?;
    info!(
        appointment_id,
        payment_cents = cents,
        payment_method = method.map(PaymentMethod::as_str),
        "appointment price updated"
    );
    Ok(appointment)
}

#[derive(Debug, Clone, Deserialize)]
pub struct MedicamentInput {
    #[serde(alias = "ID_Medicament")]
    pub medicament_id: i64,
    pub dosage: Option<String>,
    #[serde(alias = "frequence")]
    pub frequency: Option<String>,
    #[serde(alias = "duree")]
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisInput {
    #[serde(alias = "ID_Analyse")]
    pub analysis_id: i64,
}

/// Body of the details edit. Older clients send the legacy field names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailsRequest {
    pub diagnostic: Option<String>,
    pub case_description: Option<String>,
    pub weight: Option<f64>,
    pub pulse: Option<f64>,
    pub temperature: Option<f64>,
    pub blood_pressure: Option<String>,
    #[serde(alias = "tall")]
    pub height: Option<f64>,
    pub spo2: Option<f64>,
    #[serde(alias = "Sang")]
    pub blood_group: Option<String>,
    #[serde(alias = "Glycimide")]
    pub glycemia: Option<f64>,
    pub notes: Option<String>,
    #[serde(default)]
    pub medicaments: Vec<MedicamentInput>,
    #[serde(default)]
    pub analyses: Vec<AnalysisInput>,
}

impl DetailsRequest {
    pub fn validate(&self) -> Result<(), ClinicError> {
        let mut v = Validator::default();
        v.range("weight", self.weight, Some(0.0), 300.0);
        v.range("pulse", self.pulse, Some(0.0), 200.0);
        v.range("temperature", self.temperature, None, 45.0);
        v.max_len("blood_pressure", self.blood_pressure.as_deref(), 20);
        v.range("height", self.height, Some(0.0), 250.0);
        v.range("spo2", self.spo2, Some(0.0), 100.0);
        v.range("glycemia", self.glycemia, Some(0.0), 200.0);
        v.max_len("blood_group", self.blood_group.as_deref(), LINK_TEXT_MAX);
        v.max_len("notes", self.notes.as_deref(), 255);
        for (i, m) in self.medicaments.iter().enumerate() {
            v.max_len(&format!("medicaments.{i}.dosage"), m.dosage.as_deref(), LINK_TEXT_MAX);
            v.max_len(&format!("medicaments.{i}.frequency"), m.frequency.as_deref(), LINK_TEXT_MAX);
            v.max_len(&format!("medicaments.{i}.duration"), m.duration.as_deref(), LINK_TEXT_MAX);
        }
        v.finish()
    }

    pub fn into_details(self) -> AppointmentDetails {
        AppointmentDetails {
            diagnostic: self.diagnostic,
            case: CaseDescription {
                case_description: self.case_description,
                weight: self.weight,
                pulse: self.pulse,
                temperature: self.temperature,
                blood_pressure: self.blood_pressure,
                height: self.height,
                spo2: self.spo2,
                blood_group: self.blood_group,
                glycemia: self.glycemia,
                notes: self.notes,
            },
            medicaments: self
                .medicaments
                .into_iter()
                .map(|m| MedicamentLink {
                    medicament_id: m.medicament_id,
                    dosage: m.dosage,
                    frequency: m.frequency,
                    duration: m.duration,
                })
                .collect(),
            analysis_ids: self.analyses.into_iter().map(|a| a.analysis_id).collect(),
        }
    }
}

/// Diagnostic, vitals and both link sets in one transaction. Unknown
/// catalog ids reject the whole edit.
pub async fn edit_details<S>(
    store: &S,
    clock: &dyn Clock,
    appointment_id: i64,
    request: DetailsRequest,
) -> Result<(), ClinicError>
where
    S: AppointmentStore + ?Sized,
{
    request.validate()?;
    let details = request.into_details();

    match store.save_details(appointment_id, &details, clock.now()).await {
        Ok(true) => {
            info!(
                appointment_id,
                medicaments = details.medicaments.len(),
                analyses = details.analysis_ids.len(),
                "appointment details saved"
            );
            Ok(())
        }
        Ok(false) => Err(ClinicError::not_found("appointment", appointment_id)),
        Err(StoreError::UnknownReference { kind, id }) => {
            warn!(appointment_id, kind, id, "details edit rolled back, unknown reference");
            let field = match kind {
                "medicament" => "medicaments",
                "analysis" => "analyses",
                other => other,
            };
            Err(ClinicError::invalid(field, format!("unknown {kind} id {id}")))
        }
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviousVisit {
    pub appointment_id: i64,
    pub date: NaiveDateTime,
    pub medicaments: Vec<PrescriptionLine>,
    pub analyses: Vec<AnalysisRequest>,
    pub case_description: Option<CaseDescription>,
}

/// The patient's latest other appointment with what was prescribed there.
pub async fn last_info<S>(store: &S, appointment_id: i64) -> Result<PreviousVisit, ClinicError>
where
    S: AppointmentStore + ?Sized,
{
    let current = store
        .find_appointment(appointment_id)
        .await?
        .ok_or_else(|| ClinicError::not_found("appointment", appointment_id))?;

    let last = store
        .latest_for_patient(current.patient_id, current.id)
        .await?
        .ok_or_else(|| ClinicError::NotFound("no previous appointment found".into()))?;

    Ok(PreviousVisit {
        appointment_id: last.id,
        date: last.appointment_date,
        medicaments: store.prescription(last.id).await?,
        analyses: store.analyses(last.id).await?,
        case_description: store.case_description(last.id).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn price_conversion() {
        assert_eq!(price_to_cents(300.0).unwrap(), 30_000);
        assert_eq!(price_to_cents(49.99).unwrap(), 4_999);
        assert_matches!(price_to_cents(-1.0), Err(ClinicError::Validation { .. }));
        assert_matches!(price_to_cents(f64::NAN), Err(ClinicError::Validation { .. }));
    }

    #[test]
    fn vitals_out_of_range_are_all_reported() {
        let request = DetailsRequest {
            weight: Some(301.0),
            temperature: Some(46.0),
            spo2: Some(-1.0),
            notes: Some("x".repeat(256)),
            ..Default::default()
        };
        let Err(ClinicError::Validation { errors, .. }) = request.validate() else {
            panic!("expected validation failure");
        };
        let fields: Vec<&str> = errors.keys().map(String::as_str).collect();
        assert_eq!(fields, ["notes", "spo2", "temperature", "weight"]);
    }

    #[test]
    fn legacy_field_names_deserialize() {
        let request: DetailsRequest = serde_json::from_value(serde_json::json!({
            "tall": 172.0,
            "Glycimide": 1.1,
            "medicaments": [{ "ID_Medicament": 4, "frequence": "3x/day", "duree": "7 days" }],
            "analyses": [{ "ID_Analyse": 9 }]
        }))
        .unwrap();
        let details = request.into_details();
        assert_eq!(details.case.height, Some(172.0));
        assert_eq!(details.medicaments[0].frequency.as_deref(), Some("3x/day"));
        assert_eq!(details.analysis_ids, vec![9]);
    }
}
