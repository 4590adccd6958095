//! Historical trends for the statistics page.
//!
//! The full snapshot is expensive, so it is computed once per TTL window
//! and shared through the injected cache. Nothing invalidates it on writes.
//! Every series is gap filled: one point per day, month or year in the
//! window whether or not the store returned a row for it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::Serialize;
use tracing::{debug, info};

use super::ClinicError;
use crate::{
    cache::TtlCache,
    clock::Clock,
    store::{DayBucket, MonthBucket, ReportStore, YearBucket},
};

pub const STATS_CACHE_KEY: &str = "dashboard_stats_v1";
pub const DAILY_WINDOW: u64 = 30;
pub const MONTHLY_WINDOW: u32 = 12;
pub const YEARLY_WINDOW: i32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Kpi {
    pub total_patients: i64,
    pub total_appointments: i64,
    pub appointments_today: i64,
    pub appointments_month: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevenuePoint {
    pub date: String,
    pub value_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trends {
    pub daily: Vec<TrendPoint>,
    pub monthly: Vec<TrendPoint>,
    pub yearly: Vec<TrendPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevenueTrends {
    pub daily: Vec<RevenuePoint>,
    pub monthly: Vec<RevenuePoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgeBand {
    pub name: &'static str,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub confidence: u8,
    pub icon: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    pub kpi: Kpi,
    pub trends: Trends,
    pub revenue: RevenueTrends,
    pub demographics: Vec<AgeBand>,
    pub insights: Vec<Insight>,
}

/* -------------------------
   Gap filling
--------------------------*/

fn days_back(today: NaiveDate, n: u64) -> NaiveDate {
    today.checked_sub_days(Days::new(n)).unwrap_or(NaiveDate::MIN)
}

fn first_of_month(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

fn months_back(day: NaiveDate, n: u32) -> NaiveDate {
    first_of_month(day)
        .checked_sub_months(Months::new(n))
        .unwrap_or(NaiveDate::MIN)
}

/// Oldest first, `DAILY_WINDOW` points ending on `today`.
pub fn fill_daily(today: NaiveDate, rows: &[DayBucket]) -> (Vec<TrendPoint>, Vec<RevenuePoint>) {
    let by_day: HashMap<NaiveDate, &DayBucket> = rows.iter().map(|r| (r.day, r)).collect();

    (0..DAILY_WINDOW)
        .rev()
        .map(|back| {
            let day = days_back(today, back);
            let label = day.format("%d/%m").to_string();
            let row = by_day.get(&day);
            (
                TrendPoint {
                    date: label.clone(),
                    count: row.map_or(0, |r| r.count),
                },
                RevenuePoint {
                    date: label,
                    value_cents: row.map_or(0, |r| r.revenue_cents),
                },
            )
        })
        .unzip()
}

/// Oldest first, `MONTHLY_WINDOW` points ending on the month of `today`.
pub fn fill_monthly(
    today: NaiveDate,
    rows: &[MonthBucket],
) -> (Vec<TrendPoint>, Vec<RevenuePoint>) {
    let by_month: HashMap<(i32, u32), &MonthBucket> =
        rows.iter().map(|r| ((r.year, r.month), r)).collect();

    (0..MONTHLY_WINDOW)
        .rev()
        .map(|back| {
            let month = months_back(today, back);
            let label = month.format("%b %Y").to_string();
            let row = by_month.get(&(month.year(), month.month()));
            (
                TrendPoint {
                    date: label.clone(),
                    count: row.map_or(0, |r| r.count),
                },
                RevenuePoint {
                    date: label,
                    value_cents: row.map_or(0, |r| r.revenue_cents),
                },
            )
        })
        .unzip()
}

pub fn fill_yearly(current_year: i32, rows: &[YearBucket]) -> Vec<TrendPoint> {
    let by_year: HashMap<i32, i64> = rows.iter().map(|r| (r.year, r.count)).collect();
    (current_year - YEARLY_WINDOW + 1..=current_year)
        .map(|year| TrendPoint {
            date: year.to_string(),
            count: by_year.get(&year).copied().unwrap_or(0),
        })
        .collect()
}

/* -------------------------
   Demographics & insights
--------------------------*/

/// Bands are inclusive on the upper bound: 18 is a minor, 51 is "50+".
pub fn age_bands(ages: &[(i32, i64)]) -> Vec<AgeBand> {
    let mut counts = [0_i64; 4];
    for &(age, patients) in ages {
        let band = match age {
            i32::MIN..=18 => 0,
            19..=35 => 1,
            36..=50 => 2,
            _ => 3,
        };
        counts[band] += patients;
    }
    ["0-18", "19-35", "36-50", "50+"]
        .into_iter()
        .zip(counts)
        .map(|(name, value)| AgeBand { name, value })
        .collect()
}

/// Rule-based blurbs. Only the middle one depends on the data: this month
/// against the average month of the whole history.
pub fn insights(total_appointments: i64, this_month: i64) -> Vec<Insight> {
    let growing = this_month > 0 && (this_month as f64) > (total_appointments as f64 / 12.0);

    let activity = if growing {
        Insight {
            kind: "growth",
            title: "Croissance d'Activité",
            description: "Votre activité ce mois-ci est supérieure à la moyenne mensuelle. Tendance positive détectée.",
            confidence: 92,
            icon: "Zap",
        }
    } else {
        Insight {
            kind: "info",
            title: "Activité Stable",
            description: "Le volume de rendez-vous est conforme à votre moyenne habituelle.",
            confidence: 95,
            icon: "Activity",
        }
    };

    vec![
        Insight {
            kind: "prediction",
            title: "Prévision de Charge",
            description: "Basé sur l'historique, les lundis et jeudis seront probablement les jours les plus chargés le mois prochain.",
            confidence: 85,
            icon: "TrendingUp",
        },
        activity,
        Insight {
            kind: "retention",
            title: "Fidélisation Patients",
            description: "70% de vos patients sont revenus pour une consultation de suivi dans les 6 derniers mois.",
            confidence: 78,
            icon: "Users",
        },
    ]
}

/* -------------------------
   Snapshot
--------------------------*/

pub async fn compute_snapshot<S>(store: &S, today: NaiveDate) -> Result<StatisticsSnapshot, ClinicError>
where
    S: ReportStore + ?Sized,
{
    let month_start = first_of_month(today);
    let month_end = month_start
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
        .unwrap_or(today);

    let kpi = Kpi {
        total_patients: store.count_patients().await?,
        total_appointments: store.count_appointments().await?,
        appointments_today: store.count_appointments_between(today, today).await?,
        appointments_month: store
            .count_appointments_between(month_start, month_end)
            .await?,
    };

    let day_rows = store
        .day_buckets(days_back(today, DAILY_WINDOW - 1), today)
        .await?;
    // the current month is counted whole, future bookings included
    let month_rows = store
        .month_buckets(months_back(today, MONTHLY_WINDOW - 1), month_end)
        .await?;
    let year_rows = store
        .year_buckets(today.year() - YEARLY_WINDOW + 1, today.year())
        .await?;
    let ages = store.patient_ages(today).await?;

    let (daily, daily_revenue) = fill_daily(today, &day_rows);
    let (monthly, monthly_revenue) = fill_monthly(today, &month_rows);

    Ok(StatisticsSnapshot {
        insights: insights(kpi.total_appointments, kpi.appointments_month),
        kpi,
        trends: Trends {
            daily,
            monthly,
            yearly: fill_yearly(today.year(), &year_rows),
        },
        revenue: RevenueTrends {
            daily: daily_revenue,
            monthly: monthly_revenue,
        },
        demographics: age_bands(&ages),
    })
}

/// Cached snapshot. Two callers missing at once may both recompute; the
/// computation only reads.
pub async fn trends<S>(
    store: &S,
    cache: &TtlCache<Arc<StatisticsSnapshot>>,
    clock: &dyn Clock,
) -> Result<Arc<StatisticsSnapshot>, ClinicError>
where
    S: ReportStore + ?Sized,
{
    if let Some(hit) = cache.get(STATS_CACHE_KEY).await {
        debug!("statistics served from cache");
        return Ok(hit);
    }

    let snapshot = Arc::new(compute_snapshot(store, clock.today()).await?);
    cache.insert(STATS_CACHE_KEY, snapshot.clone()).await;
    info!("statistics snapshot recomputed");
    Ok(snapshot)
}

/* -------------------------
   Range & chart
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AvailableRange {
    pub min_year: i32,
    pub max_year: i32,
}

pub async fn available_range<S>(store: &S, clock: &dyn Clock) -> Result<AvailableRange, ClinicError>
where
    S: ReportStore + ?Sized,
{
    let current = clock.today().year();
    Ok(match store.appointment_date_range().await? {
        Some((min, max)) => AvailableRange {
            min_year: min.year(),
            max_year: max.year(),
        },
        None => AvailableRange {
            min_year: current,
            max_year: current,
        },
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartView {
    Year,
    Month,
}

impl ChartView {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "year" => Some(ChartView::Year),
            "month" => Some(ChartView::Month),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartPoint {
    pub date: String,
    pub count: i64,
    pub revenue_cents: i64,
}

fn chart_target_error(view: ChartView) -> ClinicError {
    match view {
        ChartView::Year => ClinicError::invalid("target", "target must be a year (YYYY)"),
        ChartView::Month => ClinicError::invalid("target", "target must be a month (YYYY-MM)"),
    }
}

/// `year` gives 12 monthly points, `month` one point per calendar day.
pub async fn chart<S>(store: &S, view: &str, target: &str) -> Result<Vec<ChartPoint>, ClinicError>
where
    S: ReportStore + ?Sized,
{
    let view = ChartView::parse(view)
        .ok_or_else(|| ClinicError::invalid("view", "view must be year or month"))?;

    match view {
        ChartView::Year => {
            let year: i32 = target
                .trim()
                .parse()
                .map_err(|_| chart_target_error(view))?;
            let from = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(|| chart_target_error(view))?;
            let to = NaiveDate::from_ymd_opt(year, 12, 31).ok_or_else(|| chart_target_error(view))?;

            let rows = store.month_buckets(from, to).await?;
            let by_month: HashMap<u32, &MonthBucket> = rows.iter().map(|r| (r.month, r)).collect();

            Ok((1..=12)
                .filter_map(|m| NaiveDate::from_ymd_opt(year, m, 1))
                .map(|first| {
                    let row = by_month.get(&first.month());
                    ChartPoint {
                        date: first.format("%b").to_string(),
                        count: row.map_or(0, |r| r.count),
                        revenue_cents: row.map_or(0, |r| r.revenue_cents),
                    }
                })
                .collect())
        }
        ChartView::Month => {
            let (year, month) =
                super::queue::parse_month(target).map_err(|_| chart_target_error(view))?;
            let from = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| chart_target_error(view))?;
            let to = from
                .checked_add_months(Months::new(1))
                .and_then(|d| d.pred_opt())
                .ok_or_else(|| chart_target_error(view))?;

            let rows = store.day_buckets(from, to).await?;
            let by_day: HashMap<NaiveDate, &DayBucket> = rows.iter().map(|r| (r.day, r)).collect();

            Ok(from
                .iter_days()
                .take_while(|d| *d <= to)
                .map(|day| {
                    let row = by_day.get(&day);
                    ChartPoint {
                        date: day.format("%d").to_string(),
                        count: row.map_or(0, |r| r.count),
                        revenue_cents: row.map_or(0, |r| r.revenue_cents),
                    }
                })
                .collect())
        }
    }
}
