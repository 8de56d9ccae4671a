use crate::config::{UpstreamConfig, PARTIDA_PLACEHOLDER};
use crate::domain::model::Coordinate;
use crate::utils::error::{AppError, Result};
use url::Url;

/// Upstream URLs the resolver calls, built once from configuration.
#[derive(Debug, Clone)]
pub struct UpstreamEndpoints {
    cadastre: Url,
    debt_url_template: String,
}

impl UpstreamEndpoints {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        let cadastre =
            Url::parse(&config.cadastre_url).map_err(|e| AppError::InvalidConfigValueError {
                field: "upstream.cadastre_url".to_string(),
                value: config.cadastre_url.clone(),
                reason: format!("Invalid URL format: {}", e),
            })?;

        if !config.debt_url_template.contains(PARTIDA_PLACEHOLDER) {
            return Err(AppError::InvalidConfigValueError {
                field: "upstream.debt_url_template".to_string(),
                value: config.debt_url_template.clone(),
                reason: format!("must contain the {} placeholder", PARTIDA_PLACEHOLDER),
            });
        }

        let endpoints = Self {
            cadastre,
            debt_url_template: config.debt_url_template.clone(),
        };
        Url::parse(&endpoints.debt_probe_url("0")).map_err(|e| {
            AppError::InvalidConfigValueError {
                field: "upstream.debt_url_template".to_string(),
                value: config.debt_url_template.clone(),
                reason: format!("Invalid URL format: {}", e),
            }
        })?;

        Ok(endpoints)
    }

    /// `{cadastre}?lng=..&lat=..`
    pub fn parcel_url(&self, coord: &Coordinate) -> String {
        self.parcel_lookup(coord).into()
    }

    /// Same lookup with the bare `ph` flag asking for horizontal sub-units.
    pub fn sub_units_url(&self, coord: &Coordinate) -> String {
        let mut url = self.parcel_lookup(coord);
        url.query_pairs_mut().append_key_only("ph");
        url.into()
    }

    pub fn debt_probe_url(&self, matrix_parcel_id: &str) -> String {
        let encoded: String =
            url::form_urlencoded::byte_serialize(matrix_parcel_id.as_bytes()).collect();
        self.debt_url_template.replace(PARTIDA_PLACEHOLDER, &encoded)
    }

    /// Coordinates go out in their shortest round-trip `f64` form.
    fn parcel_lookup(&self, coord: &Coordinate) -> Url {
        let mut url = self.cadastre.clone();
        url.query_pairs_mut()
            .append_pair("lng", &coord.lng.to_string())
            .append_pair("lat", &coord.lat.to_string());
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> UpstreamEndpoints {
        UpstreamEndpoints::from_config(&UpstreamConfig::default()).unwrap()
    }

    #[test]
    fn test_parcel_urls() {
        let coord = Coordinate::new(-34.6, -58.4);
        assert_eq!(
            endpoints().parcel_url(&coord),
            "https://epok.buenosaires.gob.ar/catastro/parcela/?lng=-58.4&lat=-34.6"
        );
        assert_eq!(
            endpoints().sub_units_url(&coord),
            "https://epok.buenosaires.gob.ar/catastro/parcela/?lng=-58.4&lat=-34.6&ph"
        );
    }

    #[test]
    fn test_parcel_url_renders_parsed_coordinates() {
        let coord: Coordinate =
            serde_json::from_value(serde_json::json!({"lat": "-34.60370", "lng": "-58.381600"}))
                .unwrap();
        assert!(endpoints()
            .parcel_url(&coord)
            .ends_with("?lng=-58.3816&lat=-34.6037"));
    }

    #[test]
    fn test_debt_probe_url_encodes_partida() {
        let url = endpoints().debt_probe_url("12 34");
        assert!(url.contains("identificadorPDF=12+34&"));
        assert!(!url.contains(PARTIDA_PLACEHOLDER));
    }

    #[test]
    fn test_template_without_placeholder_is_rejected() {
        let config = UpstreamConfig {
            debt_url_template: "https://example.com/deuda.pdf".to_string(),
            ..UpstreamConfig::default()
        };
        assert!(UpstreamEndpoints::from_config(&config).is_err());
    }
}
