use std::fmt;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use acs_core::{DeviceId, Report};
use acs_storage::Storage;

use crate::devices::DeviceStore;
use crate::error::EngineError;
use crate::parameters::ParameterStore;
use crate::resolver::IdentityResolver;

/// Last stage a rejected report reached. A report that gets past
/// `AttributesApplied` with every parameter stored is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStage {
    Received,
    IdentityResolved,
    AttributesApplied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidReport,
    StorageUnavailable,
    AttributeWriteFailed,
    ParameterWriteFailed,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidReport => "invalid_report",
            Self::StorageUnavailable => "storage_unavailable",
            Self::AttributeWriteFailed => "attribute_write_failed",
            Self::ParameterWriteFailed => "parameter_write_failed",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub device_id: DeviceId,
    pub parameters_applied: usize,
}

/// A report that did not fully converge. Must not be acknowledged to the
/// device.
///
/// `applied` entries are durably stored; `failed` and `not_attempted` are not.
#[derive(Debug, Error)]
#[error("report for {serial_number} rejected ({reason}): {source}")]
pub struct Rejected {
    pub serial_number: String,
    pub reason: RejectReason,
    pub stage: ReconcileStage,
    pub device_id: Option<DeviceId>,
    pub applied: Vec<String>,
    pub failed: Option<String>,
    pub not_attempted: Vec<String>,
    #[source]
    pub source: EngineError,
}

impl Rejected {
    fn before_parameters(
        report: &Report,
        reason: RejectReason,
        stage: ReconcileStage,
        device_id: Option<DeviceId>,
        source: EngineError,
    ) -> Self {
        Self {
            serial_number: report.serial_number.clone(),
            reason,
            stage,
            device_id,
            applied: Vec::new(),
            failed: None,
            not_attempted: report.parameter_names(),
            source,
        }
    }

    /// Whether resending the same report can succeed. Identity failures are
    /// always reported as `StorageUnavailable` and are always retryable.
    pub fn is_retryable(&self) -> bool {
        match self.reason {
            RejectReason::InvalidReport => false,
            RejectReason::StorageUnavailable => true,
            RejectReason::AttributeWriteFailed | RejectReason::ParameterWriteFailed => {
                self.source.is_retryable()
            }
        }
    }

    /// Names that still need to reach the store: the failed entry followed by
    /// everything after it.
    pub fn pending(&self) -> Vec<String> {
        self.failed
            .iter()
            .chain(self.not_attempted.iter())
            .cloned()
            .collect()
    }
}

/// Drives identity, attributes and parameters for one report, in that order,
/// and folds the outcome into a single result.
pub struct Coordinator<'a, S: ?Sized> {
    resolver: IdentityResolver<'a, S>,
    devices: DeviceStore<'a, S>,
    parameters: ParameterStore<'a, S>,
}

impl<'a, S: Storage + ?Sized> Coordinator<'a, S> {
    pub fn new(
        resolver: IdentityResolver<'a, S>,
        devices: DeviceStore<'a, S>,
        parameters: ParameterStore<'a, S>,
    ) -> Self {
        Self {
            resolver,
            devices,
            parameters,
        }
    }

    #[instrument(skip_all, fields(serial_number = %report.serial_number, parameters = report.parameters.len()))]
    pub fn reconcile(&self, report: &Report) -> Result<Committed, Rejected> {
        let outcome = self.run(report);
        match &outcome {
            Ok(committed) => info!(
                device_id = %committed.device_id,
                parameters_applied = committed.parameters_applied,
                "report committed"
            ),
            Err(rejected) => warn!(
                reason = %rejected.reason,
                stage = ?rejected.stage,
                applied = rejected.applied.len(),
                pending = rejected.not_attempted.len() + usize::from(rejected.failed.is_some()),
                error = %rejected.source,
                "report rejected"
            ),
        }
        outcome
    }

    fn run(&self, report: &Report) -> Result<Committed, Rejected> {
        let stage = ReconcileStage::Received;
        if let Err(e) = report.validate() {
            return Err(Rejected::before_parameters(
                report,
                RejectReason::InvalidReport,
                stage,
                None,
                e.into(),
            ));
        }

        let device_id = self
            .resolver
            .resolve_with(&report.serial_number, &report.attributes)
            .map_err(|e| {
                let reason = match e {
                    EngineError::InvalidReport(_) => RejectReason::InvalidReport,
                    _ => RejectReason::StorageUnavailable,
                };
                Rejected::before_parameters(report, reason, stage, None, e)
            })?;
        let stage = ReconcileStage::IdentityResolved;
        debug!(%device_id, ?stage, "stage reached");

        self.devices
            .upsert_attributes(device_id, &report.attributes)
            .map_err(|e| {
                Rejected::before_parameters(
                    report,
                    RejectReason::AttributeWriteFailed,
                    stage,
                    Some(device_id),
                    e,
                )
            })?;
        let stage = ReconcileStage::AttributesApplied;
        debug!(%device_id, ?stage, "stage reached");

        let batch = self.parameters.upsert_many(device_id, &report.parameters);
        let applied = batch.applied_names();
        if let Some(failure) = batch.failed {
            return Err(Rejected {
                serial_number: report.serial_number.clone(),
                reason: RejectReason::ParameterWriteFailed,
                stage,
                device_id: Some(device_id),
                applied,
                failed: Some(failure.name),
                not_attempted: batch.not_attempted,
                source: failure.error,
            });
        }
        debug!(%device_id, parameters = applied.len(), "parameters applied");

        Ok(Committed {
            device_id,
            parameters_applied: applied.len(),
        })
    }
}
