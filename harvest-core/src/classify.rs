//! Document classification: inferring region and instance tags from search
//! parameters or from the court name text.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::types::{Classification, ClassificationSource, DocumentMetadata};

/// Search-parameter keys carrying explicit classification hints. These are
/// the only keys the server interprets; everything else in the parameter
/// map is passed through to the scraper untouched.
pub const PARAM_COURT_REGION: &str = "CourtRegion";
pub const PARAM_INSTANCE_TYPE: &str = "INSType";

/// Pluggable classification seam. The default implementation matches the
/// registry's court-name conventions; deployments targeting a different
/// registry swap in their own.
pub trait Classify: Send + Sync {
    fn classify(
        &self,
        metadata: &DocumentMetadata,
        search_params: Option<&serde_json::Value>,
    ) -> Classification;
}

/// City-stem patterns mapped to registry region codes.
static REGION_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)Київ", "11"),
        (r"(?i)Львів", "14"),
        (r"(?i)Одес", "15"),
        (r"(?i)Харків", "19"),
        (r"(?i)Дніпро", "12"),
        (r"(?i)Запоріжж", "13"),
        (r"(?i)Вінниц", "05"),
        (r"(?i)Луцьк", "07"),
        (r"(?i)Донецьк", "14"),
        (r"(?i)Житомир", "18"),
        (r"(?i)Ужгород", "21"),
        (r"(?i)Івано-Франківськ", "06"),
        (r"(?i)Кропивницьк", "09"),
        (r"(?i)Полтав", "17"),
        (r"(?i)Рівне", "18"),
        (r"(?i)Суми", "20"),
        (r"(?i)Тернопіль", "22"),
        (r"(?i)Херсон", "23"),
        (r"(?i)Хмельницьк", "24"),
        (r"(?i)Черкас", "25"),
        (r"(?i)Чернівці", "26"),
        (r"(?i)Чернігів", "27"),
    ]
    .into_iter()
    .map(|(pattern, region)| (Regex::new(pattern).expect("static regex"), region))
    .collect()
});

/// Default classifier for the court registry.
///
/// Precedence: explicit search-parameter hints win over court-name
/// inference; inference failure leaves the classification empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct CourtClassifier;

impl Classify for CourtClassifier {
    fn classify(
        &self,
        metadata: &DocumentMetadata,
        search_params: Option<&serde_json::Value>,
    ) -> Classification {
        let mut classification = Classification::default();

        if let Some(params) = search_params {
            if let Some(region) = param_str(params, PARAM_COURT_REGION) {
                classification.court_region = Some(region);
                classification.source = Some(ClassificationSource::SearchParams);
            }
            if let Some(instance) = param_str(params, PARAM_INSTANCE_TYPE) {
                classification.instance_type = Some(instance);
                classification
                    .source
                    .get_or_insert(ClassificationSource::SearchParams);
            }
        }

        let court_name = metadata.court_name.as_deref().unwrap_or("");

        if classification.court_region.is_none() && !court_name.is_empty() {
            for (pattern, region) in REGION_PATTERNS.iter() {
                if pattern.is_match(court_name) {
                    classification.court_region = Some((*region).to_string());
                    classification
                        .source
                        .get_or_insert(ClassificationSource::ExtractedFromCourtName);
                    break;
                }
            }
        }

        if classification.instance_type.is_none() && !court_name.is_empty() {
            if let Some(instance) = instance_from_court_name(court_name) {
                classification.instance_type = Some(instance.to_string());
                classification
                    .source
                    .get_or_insert(ClassificationSource::ExtractedFromCourtName);
            }
        }

        classification
    }
}

fn param_str(params: &serde_json::Value, key: &str) -> Option<String> {
    match params.get(key)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn instance_from_court_name(court_name: &str) -> Option<&'static str> {
    let lower = court_name.to_lowercase();
    if lower.contains("апеляційн") || lower.contains("апел") {
        Some("2")
    } else if lower.contains("касаційн") || lower.contains("касац") {
        Some("3")
    } else if lower.contains("районн")
        || lower.contains("міськ")
        || lower.contains("окружн")
    {
        Some("1")
    } else {
        None
    }
}

/// Parse a site-formatted date (DD.MM.YYYY, also `/` and `-` separators;
/// two-digit years land in the 2000s). Unparseable input is dropped with a
/// warning rather than failing the registration.
pub fn parse_site_date(raw: &str) -> Option<NaiveDate> {
    let normalized = raw.replace(['/', '-'], ".");
    let parts: Vec<&str> = normalized.split('.').collect();
    if parts.len() != 3 {
        warn!(date = raw, "could not parse document date");
        return None;
    }

    let parsed = (
        parts[0].trim().parse::<u32>(),
        parts[1].trim().parse::<u32>(),
        parts[2].trim().parse::<i32>(),
    );
    match parsed {
        (Ok(day), Ok(month), Ok(mut year)) => {
            if year < 100 {
                year += 2000;
            }
            let date = NaiveDate::from_ymd_opt(year, month, day);
            if date.is_none() {
                warn!(date = raw, "could not parse document date");
            }
            date
        }
        _ => {
            warn!(date = raw, "could not parse document date");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata_with_court(name: &str) -> DocumentMetadata {
        DocumentMetadata {
            court_name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn search_params_win_over_court_name() {
        let classifier = CourtClassifier;
        let params = json!({"CourtRegion": "19", "INSType": "2"});
        let classification = classifier.classify(
            &metadata_with_court("Київський районний суд"),
            Some(&params),
        );

        assert_eq!(classification.court_region.as_deref(), Some("19"));
        assert_eq!(classification.instance_type.as_deref(), Some("2"));
        assert_eq!(
            classification.source,
            Some(ClassificationSource::SearchParams)
        );
    }

    #[test]
    fn numeric_param_values_are_accepted() {
        let classifier = CourtClassifier;
        let params = json!({"CourtRegion": 11});
        let classification =
            classifier.classify(&DocumentMetadata::default(), Some(&params));
        assert_eq!(classification.court_region.as_deref(), Some("11"));
    }

    #[test]
    fn region_and_instance_inferred_from_court_name() {
        let classifier = CourtClassifier;
        let classification =
            classifier.classify(&metadata_with_court("Львівський окружний адміністративний суд"), None);

        assert_eq!(classification.court_region.as_deref(), Some("14"));
        assert_eq!(classification.instance_type.as_deref(), Some("1"));
        assert_eq!(
            classification.source,
            Some(ClassificationSource::ExtractedFromCourtName)
        );
    }

    #[test]
    fn appellate_and_cassation_instances() {
        let classifier = CourtClassifier;
        let appellate =
            classifier.classify(&metadata_with_court("Апеляційний суд міста Києва"), None);
        assert_eq!(appellate.instance_type.as_deref(), Some("2"));

        let cassation = classifier.classify(
            &metadata_with_court("Касаційний цивільний суд"),
            None,
        );
        assert_eq!(cassation.instance_type.as_deref(), Some("3"));
    }

    #[test]
    fn inference_failure_leaves_classification_empty() {
        let classifier = CourtClassifier;
        let classification =
            classifier.classify(&metadata_with_court("Trybunał Konstytucyjny"), None);

        assert!(!classification.is_classified());
        assert_eq!(classification.source, None);
    }

    #[test]
    fn parses_site_dates_in_all_separators() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(parse_site_date("05.01.2024"), Some(expected));
        assert_eq!(parse_site_date("05/01/2024"), Some(expected));
        assert_eq!(parse_site_date("05-01-2024"), Some(expected));
        assert_eq!(parse_site_date("05.01.24"), Some(expected));
    }

    #[test]
    fn rejects_garbage_dates() {
        assert_eq!(parse_site_date("yesterday"), None);
        assert_eq!(parse_site_date("32.13.2024"), None);
        assert_eq!(parse_site_date(""), None);
    }
}
