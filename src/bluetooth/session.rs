/// One log retrieval from a RuuviTag, from connect to teardown
use log::{debug, error, info, warn};
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;

use super::transport::{Connection, LinkEvent, LinkEvents, Transport};
use crate::error::{FrameError, RetrievalError};
use crate::events::{EventSink, RetrievalEvent};
use crate::models::{LogRecord, LogRequest, SensorDestination};
use crate::protocol::{
    classify, decode_notification, encode_request, RecordOrEnd, NUS_RX_CHARACTERISTIC,
    NUS_TX_CHARACTERISTIC,
};
use crate::utils::{format_timestamp, now_epoch_secs};

const CONNECT_TIMEOUT_SECS: u64 = 40;
const MAX_SESSION_SECS: u64 = 900;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Bound on finding and connecting to the device
    pub connect_timeout: Duration,
    /// Bound on the wait for the end-of-log frame
    pub max_session_duration: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            max_session_duration: Duration::from_secs(MAX_SESSION_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    Connected,
    AwaitingData,
    Completed,
    Failed,
}

/// What a single notification did to the session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// A record was appended; carries the new record count
    Record(usize),
    EndOfStream,
    Dropped(FrameError),
    /// Arrived after the end-of-log frame
    AfterEnd,
}

/// Records gathered by one session. Only the notification path mutates it.
#[derive(Debug)]
pub struct SessionState {
    destination_address: String,
    destination: SensorDestination,
    range_start: u32,
    records: Vec<LogRecord>,
    terminated: bool,
}

impl SessionState {
    pub fn new(request: LogRequest) -> Self {
        SessionState {
            destination_address: request.device_address,
            destination: request.destination,
            range_start: request.range_start,
            records: Vec::new(),
            terminated: false,
        }
    }

    pub fn handle_notification(&mut self, data: &[u8]) -> NotificationOutcome {
        if self.is_terminated() {
            return NotificationOutcome::AfterEnd;
        }

        let frame = match decode_notification(data, self.destination) {
            Ok(frame) => frame,
            Err(e) => return NotificationOutcome::Dropped(e),
        };

        match classify(&frame) {
            RecordOrEnd::Record(record) => {
                self.records.push(record);
                NotificationOutcome::Record(self.records.len())
            }
            RecordOrEnd::EndOfStream => {
                self.terminated = true;
                NotificationOutcome::EndOfStream
            }
        }
    }

    #[cfg(test)]
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    fn take_records(&mut self) -> Vec<LogRecord> {
        std::mem::take(&mut self.records)
    }
}

/// A single-use retrieval. `run` consumes the session.
pub struct LogSession {
    state: SessionState,
    phase: SessionPhase,
    config: SessionConfig,
}

impl LogSession {
    pub fn new(request: LogRequest, config: SessionConfig) -> Self {
        LogSession {
            state: SessionState::new(request),
            phase: SessionPhase::Idle,
            config,
        }
    }

    /// Retrieve the log and report it through `sink`.
    ///
    /// Exactly one terminal event is emitted. Returns the number of records
    /// delivered with `Completed`.
    pub async fn run<T>(
        mut self,
        transport: &T,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<usize, RetrievalError>
    where
        T: Transport + ?Sized,
    {
        match self.execute(transport, sink, cancel).await {
            Ok(count) => {
                self.transition(SessionPhase::Completed);
                Ok(count)
            }
            Err(e) => {
                error!(
                    "Log retrieval from {} failed after {} records: {}",
                    self.state.destination_address,
                    self.state.record_count(),
                    e
                );
                self.transition(SessionPhase::Failed);
                sink.emit(RetrievalEvent::Failed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn execute<T>(
        &mut self,
        transport: &T,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<usize, RetrievalError>
    where
        T: Transport + ?Sized,
    {
        self.transition(SessionPhase::Connecting);
        info!("Searching for RuuviTag {}", self.state.destination_address);

        let connect = timeout(
            self.config.connect_timeout,
            transport.connect(&self.state.destination_address),
        );
        let (mut connection, mut link) = tokio::select! {
            _ = cancel.cancelled() => return Err(RetrievalError::Cancelled),
            result = connect => match result {
                Ok(Ok(opened)) => opened,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(RetrievalError::TransportTimeout),
            },
        };

        self.transition(SessionPhase::Connected);
        info!("Connected to RuuviTag, starting notify");
        sink.emit(RetrievalEvent::Connected);

        let result = self
            .await_log(&mut connection, &mut link, sink, cancel)
            .await;

        // Nothing left to close after the device dropped the link
        if result != Err(RetrievalError::UnexpectedDisconnect) {
            if let Err(e) = connection.close().await {
                warn!("Failed to close connection: {}", e);
            }
        }

        result
    }

    async fn await_log<C>(
        &mut self,
        connection: &mut C,
        link: &mut LinkEvents,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<usize, RetrievalError>
    where
        C: Connection + ?Sized,
    {
        connection.subscribe(NUS_TX_CHARACTERISTIC).await?;

        let request = encode_request(
            self.state.destination,
            self.state.range_start,
            now_epoch_secs(),
        );
        info!(
            "Requesting {} log data starting from {}",
            self.state.destination,
            format_timestamp(self.state.range_start)
        );
        connection.write(NUS_RX_CHARACTERISTIC, &request).await?;
        self.transition(SessionPhase::AwaitingData);

        let deadline = sleep(self.config.max_session_duration);
        tokio::pin!(deadline);

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return Err(RetrievalError::Cancelled),
                _ = &mut deadline => return Err(RetrievalError::SessionTimeout),
                event = link.recv() => event,
            };

            let data = match event {
                Some(LinkEvent::Notification(data)) => data,
                Some(LinkEvent::Disconnected) | None => {
                    return Err(RetrievalError::UnexpectedDisconnect)
                }
            };

            match self.state.handle_notification(&data) {
                NotificationOutcome::Record(count) => {
                    debug!("Received record {}", count);
                    sink.emit(RetrievalEvent::DataReceived { count });
                }
                NotificationOutcome::EndOfStream => {
                    info!("All log data received, closing connection");
                    let records = self.state.take_records();
                    let count = records.len();
                    sink.emit(RetrievalEvent::Completed { records });
                    return Ok(count);
                }
                NotificationOutcome::Dropped(e) => debug!("Dropping notification: {}", e),
                NotificationOutcome::AfterEnd => debug!("Ignoring notification after end of log"),
            }
        }
    }

    fn transition(&mut self, next: SessionPhase) {
        debug!("Session phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }
}
