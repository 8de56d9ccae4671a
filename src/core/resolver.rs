use crate::config::AppConfig;
use crate::core::endpoints::UpstreamEndpoints;
use crate::core::probe::{ProbeOutcome, ProbePolicy, ProbeVerdict};
use crate::domain::model::{
    sub_units_from_json, CadastralRecord, Coordinate, Deadline, ExistenceResult, FetchRequest,
    RawResponse, ResolutionResult, SubUnit,
};
use crate::domain::ports::Transport;
use crate::utils::error::{
    ResolutionError, Result, TransportError, TransportErrorKind, VerificationError,
};
use std::time::Duration;
use tracing::instrument;

/// Resolves coordinates to partidas and checks that a partida is active.
///
/// Stateless across calls: each operation opens its own [`Deadline`] and
/// threads it through every upstream fetch.
#[derive(Debug)]
pub struct ParcelResolver<T: Transport> {
    transport: T,
    endpoints: UpstreamEndpoints,
    probe_policy: ProbePolicy,
    request_deadline: Option<Duration>,
}

impl<T: Transport> ParcelResolver<T> {
    pub fn new(
        transport: T,
        endpoints: UpstreamEndpoints,
        probe_policy: ProbePolicy,
        request_deadline: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            endpoints,
            probe_policy,
            request_deadline,
        }
    }

    pub fn from_config(transport: T, config: &AppConfig) -> Result<Self> {
        Ok(Self::new(
            transport,
            UpstreamEndpoints::from_config(&config.upstream)?,
            ProbePolicy::from_config(&config.probe)?,
            config.transport.request_deadline(),
        ))
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    #[instrument(skip(self), fields(transport = self.transport.name()))]
    pub async fn resolve_parcel(
        &self,
        coord: Coordinate,
    ) -> std::result::Result<ResolutionResult, ResolutionError> {
        let deadline = Deadline::from_budget(self.request_deadline);
        let record = self
            .fetch_primary(&coord, deadline)
            .await?
            .ok_or(ResolutionError::EmptyResponse)?;

        if record.is_horizontal_property {
            let units = self.fetch_sub_units(&coord, deadline).await?;
            if units.is_empty() {
                tracing::info!("Horizontal property at {} lists no sub-units", coord);
                return Err(ResolutionError::NoData);
            }
            tracing::info!("Resolved {} sub-units at {}", units.len(), coord);
            return Ok(ResolutionResult::Multiple(units));
        }

        match record.matrix_parcel_id {
            Some(id) => {
                tracing::info!("Resolved matrix partida {} at {}", id, coord);
                Ok(ResolutionResult::Single(id))
            }
            None => {
                tracing::info!("No partida data at {}", coord);
                Err(ResolutionError::NoData)
            }
        }
    }

    #[instrument(skip(self), fields(transport = self.transport.name()))]
    pub async fn verify_existence(
        &self,
        coord: Coordinate,
    ) -> std::result::Result<ExistenceResult, VerificationError> {
        let deadline = Deadline::from_budget(self.request_deadline);
        let record = self
            .fetch_primary(&coord, deadline)
            .await?
            .ok_or(VerificationError::EmptyResponse)?;

        if record.is_horizontal_property {
            let units = self.fetch_sub_units(&coord, deadline).await?;
            if units.is_empty() {
                tracing::info!("Partida does not exist (horizontal property without units)");
                return Ok(ExistenceResult::DoesNotExist);
            }
            tracing::info!("Partida exists (horizontal property, {} units)", units.len());
            return Ok(ExistenceResult::Exists {
                matrix_parcel_id: None,
                sub_units: Some(units),
            });
        }

        let Some(id) = record.matrix_parcel_id else {
            tracing::info!("Partida does not exist (no pdamatriz or phs)");
            return Ok(ExistenceResult::DoesNotExist);
        };

        self.probe_debt(id, deadline).await
    }

    /// `Ok(None)` when the body is empty or not a JSON object.
    async fn fetch_primary(
        &self,
        coord: &Coordinate,
        deadline: Deadline,
    ) -> std::result::Result<Option<CadastralRecord>, TransportError> {
        let url = self.endpoints.parcel_url(coord);
        let response = self.fetch_ok(url, deadline).await?;
        let record = response.json().as_ref().and_then(CadastralRecord::from_json);
        if record.is_none() {
            tracing::warn!("Cadastral service returned an unusable body for {}", coord);
        }
        Ok(record)
    }

    /// Sub-unit list; a malformed body yields an empty list.
    async fn fetch_sub_units(
        &self,
        coord: &Coordinate,
        deadline: Deadline,
    ) -> std::result::Result<Vec<SubUnit>, TransportError> {
        let url = self.endpoints.sub_units_url(coord);
        let response = self.fetch_ok(url, deadline).await?;
        Ok(response
            .json()
            .map(|payload| sub_units_from_json(&payload))
            .unwrap_or_default())
    }

    async fn probe_debt(
        &self,
        matrix_parcel_id: String,
        deadline: Deadline,
    ) -> std::result::Result<ExistenceResult, VerificationError> {
        tracing::info!("Probing debt statement for partida {}", matrix_parcel_id);
        let request = FetchRequest::new(self.endpoints.debt_probe_url(&matrix_parcel_id), deadline);

        let response = match self.transport.fetch(&request).await {
            Ok(response) => response,
            Err(source) => {
                return Err(VerificationError::Probe {
                    matrix_parcel_id,
                    source,
                })
            }
        };

        let classification = self.probe_policy.classify(&ProbeOutcome::from(&response));
        tracing::debug!(
            "Probe for {} classified by {} as {:?}",
            matrix_parcel_id,
            classification.rule,
            classification.verdict
        );

        match classification.verdict {
            ProbeVerdict::Exists => {
                tracing::info!("Partida {} exists", matrix_parcel_id);
                Ok(ExistenceResult::Exists {
                    matrix_parcel_id: Some(matrix_parcel_id),
                    sub_units: None,
                })
            }
            ProbeVerdict::DoesNotExist => {
                tracing::info!("Partida {} does not exist", matrix_parcel_id);
                Ok(ExistenceResult::DoesNotExist)
            }
            ProbeVerdict::Failed { status } => {
                tracing::error!("Debt probe for {} answered {}", matrix_parcel_id, status);
                Err(VerificationError::UnclassifiedProbe {
                    matrix_parcel_id,
                    status,
                })
            }
            ProbeVerdict::Unrecognized { reason } => {
                tracing::warn!("Existence of {} is indeterminate: {}", matrix_parcel_id, reason);
                Ok(ExistenceResult::Indeterminate { reason })
            }
        }
    }

    /// Cadastral lookups must succeed; a 4xx here is a failed fetch.
    async fn fetch_ok(
        &self,
        url: String,
        deadline: Deadline,
    ) -> std::result::Result<RawResponse, TransportError> {
        let request = FetchRequest::new(url, deadline);
        let response = self.transport.fetch(&request).await?;
        if !response.is_success() {
            tracing::error!("{} answered {}", request.url, response.status);
            return Err(TransportError::new(
                request.url,
                1,
                TransportErrorKind::Status(response.status),
            ));
        }
        Ok(response)
    }
}
