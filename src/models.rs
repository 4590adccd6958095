use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    cache::TtlCache, clock::Clock, services::statistics::StatisticsSnapshot, store::ClinicStore,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ClinicStore>,
    pub clock: Arc<dyn Clock>,
    pub stats_cache: TtlCache<Arc<StatisticsSnapshot>>,
}

/* -------------------------
   Workflow enums
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Waiting,
    Preparing,
    Consulting,
    Completed,
    Canceled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 6] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Waiting,
        AppointmentStatus::Preparing,
        AppointmentStatus::Consulting,
        AppointmentStatus::Completed,
        AppointmentStatus::Canceled,
    ];

    /// Key used on the wire and in the `status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Waiting => "waiting",
            AppointmentStatus::Preparing => "preparing",
            AppointmentStatus::Consulting => "consulting",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Canceled => "canceled",
        }
    }

    /// Display label used by the front desk. Older rows stored these verbatim.
    pub fn label(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "Programmé",
            AppointmentStatus::Waiting => "Salle dattente",
            AppointmentStatus::Preparing => "En préparation",
            AppointmentStatus::Consulting => "En consultation",
            AppointmentStatus::Completed => "Terminé",
            AppointmentStatus::Canceled => "Annulé",
        }
    }

    /// Patient is physically in the clinic and not done yet.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Waiting | AppointmentStatus::Preparing | AppointmentStatus::Consulting
        )
    }

    pub fn style(self) -> StatusStyle {
        let (bg, border, text) = match self {
            AppointmentStatus::Scheduled => ("bg-blue-100", "border-blue-400", "text-blue-700"),
            AppointmentStatus::Waiting => ("bg-yellow-100", "border-yellow-400", "text-yellow-700"),
            AppointmentStatus::Preparing => ("bg-orange-100", "border-orange-400", "text-orange-700"),
            AppointmentStatus::Consulting => ("bg-purple-100", "border-purple-400", "text-purple-700"),
            AppointmentStatus::Completed => ("bg-green-100", "border-green-400", "text-green-700"),
            AppointmentStatus::Canceled => ("bg-red-100", "border-red-400", "text-red-700"),
        };
        StatusStyle { bg, border, text }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown appointment status: {}", self.0)
    }
}

impl FromStr for AppointmentStatus {
    type Err = UnknownStatus;

    /// Accepts wire keys (case-insensitive) and the legacy display labels.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        AppointmentStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(trimmed) || st.label() == trimmed)
            .ok_or_else(|| UnknownStatus(trimmed.to_string()))
    }
}

/// Presentational classes for a status chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusStyle {
    pub bg: &'static str,
    pub border: &'static str,
    pub text: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentType {
    Consultation,
    Control,
}

impl AppointmentType {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentType::Consultation => "Consultation",
            AppointmentType::Control => "Control",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "consultation" => Some(AppointmentType::Consultation),
            "control" | "controle" | "contrôle" => Some(AppointmentType::Control),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Check,
    Insurance,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Check => "check",
            PaymentMethod::Insurance => "insurance",
        }
    }

    /// Maps the values found in the old combined "mutuelle" column.
    /// Boolean-ish leftovers ("0", "1", "true") carry no method.
    pub fn from_legacy(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "cash" | "espece" | "especes" | "espèces" => Some(PaymentMethod::Cash),
            "card" | "carte" => Some(PaymentMethod::Card),
            "check" | "cheque" | "chèque" => Some(PaymentMethod::Check),
            "insurance" | "mutuelle" => Some(PaymentMethod::Insurance),
            _ => None,
        }
    }
}

/* -------------------------
   Records
--------------------------*/

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub patient_id: i64,
    pub patient_name: String,
    /// Clinic-local wall clock time; queues group on its calendar date.
    pub appointment_date: NaiveDateTime,
    pub appointment_type: Option<AppointmentType>,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
    pub consultation_started_at: Option<DateTime<Utc>>,
    pub consultation_ended_at: Option<DateTime<Utc>>,
    pub payment_cents: i64,
    pub payment_method: Option<PaymentMethod>,
    pub has_insurance_coverage: bool,
    pub diagnostic: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn day(&self) -> NaiveDate {
        self.appointment_date.date()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    /// Insurance plan as typed at the front desk ("ONE", "AUCUN", ...).
    pub insurance: Option<String>,
    pub archived: bool,
}

impl Patient {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// Whole years elapsed from `birth` to `today`.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseDescription {
    pub case_description: Option<String>,
    pub weight: Option<f64>,
    pub pulse: Option<f64>,
    pub temperature: Option<f64>,
    pub blood_pressure: Option<String>,
    pub height: Option<f64>,
    pub spo2: Option<f64>,
    pub blood_group: Option<String>,
    pub glycemia: Option<f64>,
    pub notes: Option<String>,
}

impl CaseDescription {
    pub fn is_empty(&self) -> bool {
        fn blank(s: &Option<String>) -> bool {
            s.as_deref().is_none_or(|v| v.trim().is_empty())
        }
        blank(&self.case_description)
            && self.weight.is_none()
            && self.pulse.is_none()
            && self.temperature.is_none()
            && blank(&self.blood_pressure)
            && self.height.is_none()
            && self.spo2.is_none()
            && blank(&self.blood_group)
            && self.glycemia.is_none()
            && blank(&self.notes)
    }

    /// Overlays the non-empty fields of `update` on top of `self`.
    pub fn merge(&mut self, update: &CaseDescription) {
        fn text(dst: &mut Option<String>, src: &Option<String>) {
            if let Some(v) = src.as_deref().filter(|v| !v.trim().is_empty()) {
                *dst = Some(v.to_string());
            }
        }
        fn num(dst: &mut Option<f64>, src: Option<f64>) {
            if src.is_some() {
                *dst = src;
            }
        }
        text(&mut self.case_description, &update.case_description);
        num(&mut self.weight, update.weight);
        num(&mut self.pulse, update.pulse);
        num(&mut self.temperature, update.temperature);
        text(&mut self.blood_pressure, &update.blood_pressure);
        num(&mut self.height, update.height);
        num(&mut self.spo2, update.spo2);
        text(&mut self.blood_group, &update.blood_group);
        num(&mut self.glycemia, update.glycemia);
        text(&mut self.notes, &update.notes);
    }
}

/// Dosage metadata lives on the appointment link, not on the medicament.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicamentLink {
    pub medicament_id: i64,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionLine {
    pub medicament_id: i64,
    pub name: String,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub analysis_id: i64,
    pub name: String,
}

/// Everything written by one "edit details" call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentDetails {
    pub diagnostic: Option<String>,
    pub case: CaseDescription,
    pub medicaments: Vec<MedicamentLink>,
    pub analysis_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAppointment {
    pub patient_id: i64,
    pub appointment_date: NaiveDateTime,
    pub appointment_type: AppointmentType,
    pub notes: Option<String>,
    pub payment_cents: i64,
    pub has_insurance_coverage: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: i64,
    pub patient_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCertificate {
    pub patient_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub content: String,
}
