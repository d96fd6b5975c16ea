//! Wire documents fetched from the central authority: the top-level
//! configuration document and the per-API endpoint catalog it references.

use std::collections::HashMap;

use serde::Deserialize;

use crate::model::ThroughputClass;

/// Top-level document returned by `LoadConfigurationSettings()`
/// (here, `GET /settings/api_configuration.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct TopLevelDocument {
    pub version: String,
    #[serde(default)]
    pub report_settings: ReportSettingsWire,
    pub validation_settings: ValidationSettingsWire,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReportSettingsWire {
    #[serde(default)]
    pub execution_window_minutes: Option<u64>,
    #[serde(default)]
    pub execution_number: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationSettingsWire {
    /// Five-class sampling table (the authoritative shape). Some
    /// revisions of the central authority instead send a two-rate
    /// document (`transmitter_validation_rate`/`receiver_validation_rate`);
    /// when `rates` is absent, [`normalize_rates`] maps all five classes
    /// onto the nearer of those two values.
    #[serde(default)]
    pub rates: Option<HashMap<ThroughputClass, u8>>,
    #[serde(default)]
    pub transmitter_validation_rate: Option<u8>,
    #[serde(default)]
    pub receiver_validation_rate: Option<u8>,
    pub api_group_settings: Vec<ApiGroupSettingWire>,
}

impl ValidationSettingsWire {
    /// Resolves the effective per-class sampling table, normalizing a
    /// legacy two-rate document onto the mode-appropriate rate.
    pub fn normalize_rates(&self, is_transmitter: bool) -> HashMap<ThroughputClass, u8> {
        if let Some(rates) = &self.rates {
            return rates.clone();
        }

        let rate = if is_transmitter {
            self.transmitter_validation_rate
        } else {
            self.receiver_validation_rate
        }
        .unwrap_or(100);

        [
            ThroughputClass::ExtremelyHigh,
            ThroughputClass::High,
            ThroughputClass::Medium,
            ThroughputClass::Low,
            ThroughputClass::VeryLow,
        ]
        .into_iter()
        .map(|class| (class, rate))
        .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiGroupSettingWire {
    pub group: String,
    pub base_path: String,
    pub api_list: Vec<ApiSettingWire>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettingWire {
    pub name: String,
    pub base_path: String,
    pub version: String,
    pub endpoint_base: String,
}

/// One entry in `<groupBase>/<apiBase>/<version>/response/endpoints.json`.
/// Header/body schemas are carried inline as strings; the transport
/// "loads bytes, parses as JSON or string" uniformly, so both an inline
/// document and a fetched-then-embedded one look identical here.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointCatalogEntryWire {
    pub endpoint: String,
    #[serde(default)]
    pub throughput_class: Option<ThroughputClass>,
    #[serde(default)]
    pub header_schema: String,
    #[serde(default)]
    pub body_schema: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_rate_document_normalizes_to_five_classes() {
        let settings = ValidationSettingsWire {
            rates: None,
            transmitter_validation_rate: Some(30),
            receiver_validation_rate: Some(80),
            api_group_settings: vec![],
        };

        let transmitter_rates = settings.normalize_rates(true);
        assert_eq!(transmitter_rates.len(), 5);
        assert!(transmitter_rates.values().all(|&r| r == 30));

        let receiver_rates = settings.normalize_rates(false);
        assert!(receiver_rates.values().all(|&r| r == 80));
    }

    #[test]
    fn explicit_five_class_table_is_used_verbatim() {
        let mut rates = HashMap::new();
        rates.insert(ThroughputClass::ExtremelyHigh, 5);
        rates.insert(ThroughputClass::VeryLow, 100);

        let settings = ValidationSettingsWire {
            rates: Some(rates),
            transmitter_validation_rate: None,
            receiver_validation_rate: None,
            api_group_settings: vec![],
        };

        let resolved = settings.normalize_rates(true);
        assert_eq!(resolved.get(&ThroughputClass::ExtremelyHigh), Some(&5));
        assert_eq!(resolved.get(&ThroughputClass::VeryLow), Some(&100));
    }
}
