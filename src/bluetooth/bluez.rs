/// BlueZ-backed transport for reading RuuviTag logs over GATT
use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::{
    Adapter, AdapterEvent, Address, Device, DeviceEvent, DeviceProperty, DiscoveryFilter,
    DiscoveryTransport, Session, Uuid,
};
use futures_util::{pin_mut, StreamExt};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{sleep, Duration};

use super::transport::{Connection, LinkEvent, LinkEvents, Transport};
use crate::error::TransportError;

// How often to check whether GATT services have been resolved after connecting
const SERVICES_POLL_MILLIS: u64 = 250;

pub struct BluezTransport {
    _session: Session,
    adapter: Adapter,
}

impl BluezTransport {
    /// Open a BlueZ session on the default adapter and power it on
    pub async fn new() -> Result<Self, TransportError> {
        // Initialize Bluetooth session
        let session = match Session::new().await {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to create Bluetooth session: {}", e);
                return Err(e.into());
            }
        };

        // Get the default Bluetooth adapter
        let adapter = match session.default_adapter().await {
            Ok(adapter) => adapter,
            Err(e) => {
                error!("Failed to get default Bluetooth adapter: {}", e);
                return Err(e.into());
            }
        };

        // Ensure Bluetooth adapter is powered on
        if let Err(e) = adapter.set_powered(true).await {
            error!("Failed to power on adapter: {}", e);
            return Err(e.into());
        }

        info!("Using Bluetooth adapter {}", adapter.name());

        Ok(BluezTransport {
            _session: session,
            adapter,
        })
    }

    /// Run LE discovery until `address` is known to the adapter
    async fn find_device(&self, address: Address) -> Result<Device, TransportError> {
        let filter = DiscoveryFilter {
            transport: DiscoveryTransport::Le, // Bluetooth Low Energy only
            duplicate_data: false,
            ..Default::default()
        };

        // Apply the discovery filter (warn if it fails, but continue)
        if let Err(e) = self.adapter.set_discovery_filter(filter).await {
            warn!("Failed to set discovery filter: {}", e);
        }

        // Discovery stops when the stream is dropped
        let discovery = self.adapter.discover_devices().await?;
        pin_mut!(discovery);

        if self.adapter.device_addresses().await?.contains(&address) {
            debug!("Device {} already known to the adapter", address);
            return Ok(self.adapter.device(address)?);
        }

        while let Some(event) = discovery.next().await {
            match event {
                AdapterEvent::DeviceAdded(added) if added == address => {
                    debug!("Discovered {}", address);
                    return Ok(self.adapter.device(address)?);
                }
                event => debug!("Discovery event: {:?}", event),
            }
        }

        Err(TransportError::DeviceNotFound(address.to_string()))
    }
}

#[async_trait]
impl Transport for BluezTransport {
    type Connection = BluezConnection;

    /// Connect to a RuuviTag and resolve its GATT characteristics
    ///
    /// # Arguments
    /// * `address` - Bluetooth address of the tag, e.g. "C8:25:2D:8E:9C:2C"
    ///
    /// # Returns
    /// * `Ok((BluezConnection, LinkEvents))` - Open connection and its event stream
    /// * `Err(TransportError)` - If the address is invalid or the link could not be set up
    async fn connect(
        &self,
        address: &str,
    ) -> Result<(BluezConnection, LinkEvents), TransportError> {
        // Parse the address before touching the adapter
        let address: Address = address
            .parse()
            .map_err(|_| TransportError::InvalidAddress(address.to_string()))?;

        // Discover the device
        let device = self.find_device(address).await?;

        // Watch the connected property before connecting so an early drop is not missed
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = watch_disconnect(device.clone(), tx.clone()).await?;

        // Connect and resolve services; the guard tears the link down on failure or drop
        let guard = TeardownGuard::new(device.clone(), watcher.abort_handle());
        let characteristics = guarded(guard, open_link(&device, &tx)).await?;
        debug!(
            "Resolved {} characteristics on {}",
            characteristics.len(),
            address
        );

        Ok((
            BluezConnection {
                device,
                characteristics,
                tx,
                tasks: vec![watcher],
            },
            rx,
        ))
    }
}

/// Bring up the link and index the characteristics of every service
async fn open_link(
    device: &Device,
    tx: &mpsc::UnboundedSender<LinkEvent>,
) -> Result<HashMap<Uuid, Characteristic>, TransportError> {
    if !device.is_connected().await? {
        device.connect().await?;
    }

    // Wait for GATT services, giving up if the link drops meanwhile
    while !device.is_services_resolved().await? {
        if !device.is_connected().await? {
            return Err(TransportError::Disconnected);
        }
        sleep(Duration::from_millis(SERVICES_POLL_MILLIS)).await;
    }

    let mut characteristics = HashMap::new();
    for service in device.services().await? {
        for characteristic in service.characteristics().await? {
            characteristics.insert(characteristic.uuid().await?, characteristic);
        }
    }

    // The watcher only sees changes, so report a link that is already gone
    if !device.is_connected().await? {
        debug!("Device {} dropped the link during setup", device.address());
        let _ = tx.send(LinkEvent::Disconnected);
    }

    Ok(characteristics)
}

/// Report `Disconnected` once the device's connected property drops
async fn watch_disconnect(
    device: Device,
    tx: mpsc::UnboundedSender<LinkEvent>,
) -> Result<JoinHandle<()>, TransportError> {
    let (ready_tx, ready_rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        let events = match device.events().await {
            Ok(events) => {
                let _ = ready_tx.send(Ok(()));
                events
            }
            Err(e) => {
                let _ = ready_tx.send(Err(TransportError::from(e)));
                return;
            }
        };
        pin_mut!(events);

        while let Some(event) = events.next().await {
            if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(false)) = event {
                debug!("Device {} reported disconnect", device.address());
                let _ = tx.send(LinkEvent::Disconnected);
                break;
            }
        }
    });

    await_ready(ready_rx).await?;
    Ok(handle)
}

/// Something holding a link that must be dropped if setup does not finish
#[async_trait]
trait LinkTeardown: Send + Sync + 'static {
    async fn teardown(&self) -> Result<(), TransportError>;
}

#[async_trait]
impl LinkTeardown for Device {
    async fn teardown(&self) -> Result<(), TransportError> {
        self.disconnect().await?;
        Ok(())
    }
}

/// Tears down a half-open link unless disarmed.
///
/// Dropping an armed guard (timeout or cancellation of the connect future)
/// spawns the teardown, since `Drop` cannot await.
struct TeardownGuard<L: LinkTeardown> {
    link: Option<L>,
    watcher: AbortHandle,
}

impl<L: LinkTeardown> TeardownGuard<L> {
    fn new(link: L, watcher: AbortHandle) -> Self {
        TeardownGuard {
            link: Some(link),
            watcher,
        }
    }

    fn disarm(&mut self) {
        self.link = None;
    }

    async fn teardown(mut self) {
        self.watcher.abort();
        if let Some(link) = self.link.take() {
            if let Err(e) = link.teardown().await {
                warn!("Failed to disconnect after setup error: {}", e);
            }
        }
    }
}

impl<L: LinkTeardown> Drop for TeardownGuard<L> {
    fn drop(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        self.watcher.abort();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = link.teardown().await {
                        warn!("Failed to disconnect abandoned link: {}", e);
                    }
                });
            }
            Err(_) => warn!("No runtime left to disconnect abandoned link"),
        }
    }
}

/// Run `setup` under `guard`: disarm on success, tear down on error
async fn guarded<L, T, F>(mut guard: TeardownGuard<L>, setup: F) -> Result<T, TransportError>
where
    L: LinkTeardown,
    F: Future<Output = Result<T, TransportError>>,
{
    match setup.await {
        Ok(value) => {
            guard.disarm();
            Ok(value)
        }
        Err(e) => {
            guard.teardown().await;
            Err(e)
        }
    }
}

async fn await_ready(
    ready_rx: oneshot::Receiver<Result<(), TransportError>>,
) -> Result<(), TransportError> {
    ready_rx
        .await
        .map_err(|_| TransportError::Protocol("link task ended before starting".to_string()))?
}

pub struct BluezConnection {
    device: Device,
    characteristics: HashMap<Uuid, Characteristic>,
    tx: mpsc::UnboundedSender<LinkEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl BluezConnection {
    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, TransportError> {
        self.characteristics
            .get(&uuid)
            .cloned()
            .ok_or_else(|| TransportError::CharacteristicNotFound(uuid.to_string()))
    }
}

#[async_trait]
impl Connection for BluezConnection {
    async fn subscribe(&mut self, uuid: Uuid) -> Result<(), TransportError> {
        let characteristic = self.characteristic(uuid)?;
        let tx = self.tx.clone();
        let (ready_tx, ready_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let notifications = match characteristic.notify().await {
                Ok(notifications) => {
                    let _ = ready_tx.send(Ok(()));
                    notifications
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(TransportError::from(e)));
                    return;
                }
            };
            pin_mut!(notifications);

            while let Some(value) = notifications.next().await {
                if tx.send(LinkEvent::Notification(value)).is_err() {
                    break;
                }
            }
        });
        self.tasks.push(handle);

        await_ready(ready_rx).await
    }

    async fn write(&mut self, uuid: Uuid, data: &[u8]) -> Result<(), TransportError> {
        let characteristic = self.characteristic(uuid)?;
        characteristic.write(data).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.device.disconnect().await?;
        Ok(())
    }
}

impl Drop for BluezConnection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
