//! The transport seam between a device and the cloud.

use std::sync::Arc;

use crate::error::EngineResult;
use marksync_model::{DownloadRequest, Session, UpdateBatch};
use marksync_server::{CloudHub, PushOutcome};
use marksync_storage::Mutation;

/// What a device needs from the cloud: upload and download.
///
/// Real deployments put a wire protocol behind this; tests and
/// single-process setups use [`LoopbackBackend`].
pub trait CloudBackend: Send + Sync {
    /// Uploads a batch of captured local mutations.
    fn push(&self, session: &Session, mutations: &[Mutation]) -> EngineResult<PushOutcome>;

    /// Downloads pending updates for the requesting device.
    fn pull(&self, request: &DownloadRequest) -> EngineResult<UpdateBatch>;
}

/// A backend that calls an in-process [`CloudHub`] directly.
pub struct LoopbackBackend {
    hub: Arc<CloudHub>,
}

impl LoopbackBackend {
    /// Wraps the hub.
    pub fn new(hub: Arc<CloudHub>) -> Self {
        Self { hub }
    }

    /// The wrapped hub.
    pub fn hub(&self) -> &CloudHub {
        &self.hub
    }
}

impl CloudBackend for LoopbackBackend {
    fn push(&self, session: &Session, mutations: &[Mutation]) -> EngineResult<PushOutcome> {
        Ok(self.hub.push(session, mutations)?)
    }

    fn pull(&self, request: &DownloadRequest) -> EngineResult<UpdateBatch> {
        Ok(self.hub.download_client_updates(request)?)
    }
}
