/// Admission control for log retrievals: at most one session at a time
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use crate::bluetooth::{LogSession, SessionConfig, Transport};
use crate::error::RetrievalError;
use crate::events::{EventSink, RetrievalEvent};
use crate::models::LogRequest;

const BUSY_RETRIES: u32 = 5;
const BUSY_RETRY_INTERVAL_SECS: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// How many more times a request waits for a running session to finish
    pub busy_retries: u32,
    pub busy_retry_interval: Duration,
    pub session: SessionConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            busy_retries: BUSY_RETRIES,
            busy_retry_interval: Duration::from_secs(BUSY_RETRY_INTERVAL_SECS),
            session: SessionConfig::default(),
        }
    }
}

/// Handle to a requested retrieval. Results still arrive through the sink.
pub struct RetrievalHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RetrievalHandle {
    /// Abort the retrieval, whether it is waiting for admission or running
    #[cfg(test)]
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait until the retrieval has emitted its terminal event
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            error!("Retrieval task ended abnormally: {}", e);
        }
    }
}

/// Owns the transport and the event sink and runs sessions one at a time.
///
/// The running session holds the admission lock for its whole lifetime.
pub struct RetrievalSupervisor<T> {
    transport: Arc<T>,
    sink: Arc<dyn EventSink>,
    config: SupervisorConfig,
    admission: Arc<Mutex<()>>,
}

impl<T> RetrievalSupervisor<T>
where
    T: Transport + 'static,
{
    pub fn new(transport: Arc<T>, sink: Arc<dyn EventSink>, config: SupervisorConfig) -> Self {
        RetrievalSupervisor {
            transport,
            sink,
            config,
            admission: Arc::new(Mutex::new(())),
        }
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.admission.try_lock().is_err()
    }

    /// Start retrieving the log of `address` from `range_start_epoch_secs`.
    ///
    /// Returns immediately. Invalid arguments are reported as a `Failed`
    /// event and yield `None`. If another session is running the request
    /// waits for it within the retry budget and fails with "Could not start
    /// new thread" once the budget is spent.
    pub fn request_retrieval(
        &self,
        address: &str,
        range_start_epoch_secs: i64,
        sensor_kind: &str,
    ) -> Option<RetrievalHandle> {
        let request = match LogRequest::new(address, range_start_epoch_secs, sensor_kind) {
            Ok(request) => request,
            Err(e) => {
                error!("Rejected log request for {}: {}", address, e);
                self.sink.emit(RetrievalEvent::Failed {
                    reason: e.to_string(),
                });
                return None;
            }
        };

        // First attempt happens on the caller's side so requests are admitted
        // in the order they were made
        let first_attempt = Arc::clone(&self.admission).try_lock_owned().ok();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_when_admitted(
            request,
            first_attempt,
            Arc::clone(&self.admission),
            Arc::clone(&self.transport),
            Arc::clone(&self.sink),
            self.config,
            cancel.clone(),
        ));

        Some(RetrievalHandle { cancel, task })
    }
}

async fn run_when_admitted<T>(
    request: LogRequest,
    first_attempt: Option<OwnedMutexGuard<()>>,
    admission: Arc<Mutex<()>>,
    transport: Arc<T>,
    sink: Arc<dyn EventSink>,
    config: SupervisorConfig,
    cancel: CancellationToken,
) where
    T: Transport + 'static,
{
    let admitted = match first_attempt {
        Some(guard) => Ok(guard),
        None => tokio::select! {
            _ = cancel.cancelled() => Err(RetrievalError::Cancelled),
            result = wait_for_admission(admission, &config) => result,
        },
    };

    let _guard = match admitted {
        Ok(guard) => guard,
        Err(e) => {
            error!("Could not start log retrieval from {}: {}", request.device_address, e);
            sink.emit(RetrievalEvent::Failed {
                reason: e.to_string(),
            });
            return;
        }
    };

    let address = request.device_address.clone();
    let session = LogSession::new(request, config.session);
    if let Ok(count) = session.run(transport.as_ref(), sink.as_ref(), &cancel).await {
        info!("Retrieved {} log records from {}", count, address);
    }
}

async fn wait_for_admission(
    admission: Arc<Mutex<()>>,
    config: &SupervisorConfig,
) -> Result<OwnedMutexGuard<()>, RetrievalError> {
    for attempt in 1..=config.busy_retries {
        warn!(
            "Previous retrieval still running, retrying ({}/{})",
            attempt, config.busy_retries
        );
        sleep(config.busy_retry_interval).await;
        if let Ok(guard) = Arc::clone(&admission).try_lock_owned() {
            return Ok(guard);
        }
    }

    Err(RetrievalError::SupervisorBusy)
}
