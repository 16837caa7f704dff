use async_trait::async_trait;
use bluer::Uuid;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use super::transport::{Connection, LinkEvent, LinkEvents, Transport};
use crate::error::TransportError;
use crate::protocol::END_OF_LOG;

/// One thing the scripted device does after receiving the request
#[derive(Clone, Debug)]
pub enum Step {
    Notify(Vec<u8>),
    Delay(Duration),
    Disconnect,
}

#[derive(Clone, Debug)]
pub enum MockConnect {
    Succeed,
    Fail(String),
    /// Never finishes connecting
    Hang,
    /// Connects, but the link dropped before the connection was handed over
    LinkDown,
}

#[derive(Debug, Default)]
struct Recorded {
    connects: usize,
    subscriptions: Vec<Uuid>,
    writes: Vec<(Uuid, Vec<u8>)>,
    closed: bool,
}

#[derive(Clone, Debug)]
pub struct MockTransport {
    connect: MockConnect,
    script: Vec<Step>,
    write_error: Option<String>,
    recorded: Arc<Mutex<Recorded>>,
}

impl MockTransport {
    pub fn new(connect: MockConnect, script: Vec<Step>) -> Self {
        MockTransport {
            connect,
            script,
            write_error: None,
            recorded: Arc::default(),
        }
    }

    pub fn scripted(script: Vec<Step>) -> Self {
        Self::new(MockConnect::Succeed, script)
    }

    pub fn failing_writes(mut self, message: &str) -> Self {
        self.write_error = Some(message.to_string());
        self
    }

    pub fn connects(&self) -> usize {
        self.recorded.lock().unwrap().connects
    }

    pub fn subscriptions(&self) -> Vec<Uuid> {
        self.recorded.lock().unwrap().subscriptions.clone()
    }

    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.recorded.lock().unwrap().writes.clone()
    }

    pub fn was_closed(&self) -> bool {
        self.recorded.lock().unwrap().closed
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Connection = MockConnection;

    async fn connect(
        &self,
        _address: &str,
    ) -> Result<(MockConnection, LinkEvents), TransportError> {
        self.recorded.lock().unwrap().connects += 1;
        match &self.connect {
            MockConnect::Succeed | MockConnect::LinkDown => {}
            MockConnect::Fail(message) => return Err(TransportError::Protocol(message.clone())),
            MockConnect::Hang => std::future::pending::<()>().await,
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if let MockConnect::LinkDown = self.connect {
            let _ = tx.send(LinkEvent::Disconnected);
        }
        Ok((
            MockConnection {
                tx,
                script: self.script.clone(),
                write_error: self.write_error.clone(),
                recorded: Arc::clone(&self.recorded),
            },
            rx,
        ))
    }
}

pub struct MockConnection {
    tx: mpsc::UnboundedSender<LinkEvent>,
    script: Vec<Step>,
    write_error: Option<String>,
    recorded: Arc<Mutex<Recorded>>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn subscribe(&mut self, characteristic: Uuid) -> Result<(), TransportError> {
        self.recorded
            .lock()
            .unwrap()
            .subscriptions
            .push(characteristic);
        Ok(())
    }

    async fn write(&mut self, characteristic: Uuid, data: &[u8]) -> Result<(), TransportError> {
        self.recorded
            .lock()
            .unwrap()
            .writes
            .push((characteristic, data.to_vec()));
        if let Some(message) = &self.write_error {
            return Err(TransportError::Protocol(message.clone()));
        }

        // The device answers the request by playing the script
        let tx = self.tx.clone();
        let script = std::mem::take(&mut self.script);
        tokio::spawn(async move {
            for step in script {
                match step {
                    Step::Notify(data) => {
                        let _ = tx.send(LinkEvent::Notification(data));
                    }
                    Step::Delay(duration) => sleep(duration).await,
                    Step::Disconnect => {
                        let _ = tx.send(LinkEvent::Disconnected);
                    }
                }
            }
        });
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.recorded.lock().unwrap().closed = true;
        Ok(())
    }
}

/// A log frame as the tag sends it
pub fn notification(destination: u8, timestamp: u32, value: u32) -> Vec<u8> {
    let mut data = vec![destination, destination, 0x10];
    data.extend_from_slice(&timestamp.to_be_bytes());
    data.extend_from_slice(&value.to_be_bytes());
    data
}

pub fn end_of_log(destination: u8) -> Vec<u8> {
    notification(destination, END_OF_LOG, END_OF_LOG)
}
