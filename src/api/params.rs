//! Lenient query parameter handling.
//!
//! Values that do not parse are dropped instead of rejected, so every
//! field is taken as a raw string first.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::{
    config::ApiConfig,
    models::{ExtractionFilter, ExtractionStatus, PageRequest, TimeRange},
};

const DEFAULT_UPCOMING_HOURS: i64 = 24;
const MAX_UPCOMING_HOURS: i64 = 24 * 365;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub corporation_id: Option<String>,
    pub system_id: Option<String>,
    pub region_id: Option<String>,
    pub status: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub hours: Option<String>,
}

fn parse_id(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v.trim()).ok())
        .map(|t| t.with_timezone(&Utc))
}

impl ListParams {
    pub fn corporation_id(&self) -> Option<i64> {
        parse_id(self.corporation_id.as_deref())
    }

    pub fn system_id(&self) -> Option<i64> {
        parse_id(self.system_id.as_deref())
    }

    pub fn region_id(&self) -> Option<i64> {
        parse_id(self.region_id.as_deref())
    }

    pub fn status(&self) -> Option<ExtractionStatus> {
        self.status.as_deref().and_then(|s| s.parse().ok())
    }

    /// Both bounds must be present and valid
    pub fn time_range(&self) -> Option<TimeRange> {
        let start = parse_time(self.start_time.as_deref())?;
        let end = parse_time(self.end_time.as_deref())?;
        Some(TimeRange::new(start, end))
    }

    /// Length of the upcoming window, 24 hours unless a valid count is given
    pub fn upcoming_window(&self) -> Duration {
        let hours = self
            .hours
            .as_deref()
            .and_then(|h| h.trim().parse::<i64>().ok())
            .filter(|h| (0..=MAX_UPCOMING_HOURS).contains(h))
            .unwrap_or(DEFAULT_UPCOMING_HOURS);
        Duration::hours(hours)
    }

    pub fn page_request(&self, config: &ApiConfig) -> PageRequest {
        let page = self
            .page
            .as_deref()
            .and_then(|p| p.trim().parse::<u32>().ok())
            .unwrap_or(1);
        let per_page = self
            .per_page
            .as_deref()
            .and_then(|p| p.trim().parse::<u32>().ok())
            .unwrap_or(config.default_per_page);
        PageRequest::new(page, per_page, config.max_results)
    }

    /// Filter for listing endpoints.
    ///
    /// Without a recognised status only extractions whose chunk has not yet
    /// arrived are listed, unless `include_completed` is set.
    pub fn list_filter(&self, now: DateTime<Utc>, include_completed: bool) -> ExtractionFilter {
        let status = self.status();
        ExtractionFilter {
            corporation_id: self.corporation_id(),
            system_id: self.system_id(),
            region_id: self.region_id(),
            status,
            arrival_window: self.time_range(),
            arriving_after: (status.is_none() && !include_completed).then_some(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn params(pairs: &[(&str, &str)]) -> ListParams {
        let query = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        from_query(&query)
    }

    fn from_query(query: &str) -> ListParams {
        let uri: axum::http::Uri = format!("/?{query}").parse().unwrap();
        axum::extract::Query::try_from_uri(&uri).unwrap().0
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn invalid_values_are_ignored() {
        let params = params(&[
            ("corporation_id", "abc"),
            ("status", "in_progress"),
            ("per_page", "-5"),
            ("hours", "lots"),
        ]);

        let filter = params.list_filter(now(), false);
        assert_eq!(filter.corporation_id, None);
        assert_eq!(filter.status, None);
        assert_eq!(filter.arriving_after, Some(now()));
        assert_eq!(params.page_request(&ApiConfig::default()).per_page, 50);
        assert_eq!(params.upcoming_window(), Duration::hours(24));
    }

    #[test]
    fn per_page_is_clamped() {
        let params = params(&[("per_page", "5000"), ("page", "2")]);
        let request = params.page_request(&ApiConfig::default());

        assert_eq!(request.per_page, 1000);
        assert_eq!(request.page, 2);
    }

    #[test]
    fn time_range_requires_both_bounds() {
        let only_start = params(&[("start_time", "2024-03-01T00:00:00Z")]);
        assert_eq!(only_start.time_range(), None);

        let both = params(&[
            ("start_time", "2024-03-01T00:00:00Z"),
            ("end_time", "2024-03-02T00:00:00Z"),
        ]);
        let range = both.time_range().unwrap();
        assert_eq!(range.start, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn status_disables_upcoming_default() {
        let params = params(&[("status", "completed")]);
        let filter = params.list_filter(now(), false);

        assert_eq!(filter.status, Some(ExtractionStatus::Completed));
        assert_eq!(filter.arriving_after, None);
    }

    #[test]
    fn include_completed_disables_upcoming_default() {
        let filter = ListParams::default().list_filter(now(), true);
        assert_eq!(filter.arriving_after, None);
    }
}
