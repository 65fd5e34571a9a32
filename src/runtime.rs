//! Async driver for Rust hosts
//!
//! [`MapClient::spawn`] moves a [`MapViewController`] onto a tokio task. Host
//! calls arrive over a channel and run one at a time; between calls the task
//! sleeps until the next deferred action (post-load resize, popup debounce)
//! comes due and runs it.
//!
//! The `initialize_mapbox` .. `clear_merchant_markers` methods form the host
//! surface: failures are logged and swallowed so the host stays responsive.

use std::future::pending;

use log::debug;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::core::controller::MapViewController;
use crate::core::engine::{MapEngine, MapEvent, MapHandle};
use crate::core::error::{report, Error, Result};

type Command<E> = Box<dyn FnOnce(&mut MapViewController<E>) + Send>;

/// Cloneable handle to a controller running on its own task
pub struct MapClient<E: MapEngine> {
    tx: mpsc::UnboundedSender<Command<E>>,
}

impl<E: MapEngine> Clone for MapClient<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E> MapClient<E>
where
    E: MapEngine + Send + 'static,
{
    /// Start the driver task; it stops once every client is dropped
    pub fn spawn(controller: MapViewController<E>) -> (Self, JoinHandle<MapViewController<E>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive(controller, rx));
        (Self { tx }, task)
    }

    /// Run `f` against the controller and return its result
    pub async fn with<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut MapViewController<E>) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command: Command<E> = Box::new(move |controller| {
            // The caller may have given up waiting
            let _ = reply_tx.send(f(controller));
        });
        self.tx.send(command).map_err(|_| Error::DriverStopped)?;
        reply_rx.await.map_err(|_| Error::DriverStopped)
    }

    /// Create the map view; `None` when it could not be created
    pub async fn initialize_mapbox(&self, container_id: &str, lat: f64, lon: f64, zoom: f64) -> Option<MapHandle> {
        let container_id = container_id.to_string();
        let result = self
            .with(move |c| c.initialize(&container_id, lat, lon, zoom))
            .await
            .and_then(|r| r);
        report("initialize_mapbox", result)
    }

    pub async fn resize_map(&self) {
        let result = self.with(|c| c.resize()).await.and_then(|r| r);
        report("resize_map", result);
    }

    pub async fn cleanup_mapbox(&self) {
        report("cleanup_mapbox", self.with(|c| c.teardown()).await);
    }

    pub async fn add_merchants(&self, merchants_json: &str) {
        let json = merchants_json.to_string();
        let result = self.with(move |c| c.add_merchants(&json)).await.and_then(|r| r);
        report("add_merchants", result);
    }

    pub async fn clear_merchant_markers(&self) {
        report(
            "clear_merchant_markers",
            self.with(|c| c.clear_merchant_markers()).await,
        );
    }

    /// Forward an engine or host notification
    pub async fn notify(&self, event: MapEvent) {
        let result = self.with(move |c| c.handle_event(event)).await.and_then(|r| r);
        report("notify", result);
    }
}

async fn drive<E: MapEngine>(
    mut controller: MapViewController<E>,
    mut rx: mpsc::UnboundedReceiver<Command<E>>,
) -> MapViewController<E> {
    loop {
        let next_due = controller.next_due();
        let timer = async move {
            match next_due {
                Some(due) => sleep_until(due).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            command = rx.recv() => match command {
                Some(command) => command(&mut controller),
                None => break,
            },
            _ = timer => controller.run_due(Instant::now()),
        }
    }

    debug!("Map driver stopping");
    controller
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::headless::HeadlessEngine;
    use std::time::Duration;

    const ONE: &str =
        r#"[{"name":"A","latitude":48.86,"longitude":2.36,"availableBaskets":3,"price":5.5}]"#;

    fn client() -> (MapClient<HeadlessEngine>, JoinHandle<MapViewController<HeadlessEngine>>) {
        MapClient::spawn(MapViewController::new(HeadlessEngine::with_containers(["map"])))
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_resize_fires_after_load() {
        let (client, _task) = client();
        let handle = client.initialize_mapbox("map", 48.85, 2.35, 12.0).await.unwrap();
        client.notify(MapEvent::Loaded(handle)).await;

        let resized = client
            .with(move |c| c.engine().map(handle).unwrap().resize_count)
            .await
            .unwrap();
        assert_eq!(resized, 0);

        tokio::time::sleep(Duration::from_millis(250)).await;
        let resized = client
            .with(move |c| c.engine().map(handle).unwrap().resize_count)
            .await
            .unwrap();
        assert_eq!(resized, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_popup_dismissed_after_debounce() {
        let (client, _task) = client();
        let handle = client.initialize_mapbox("map", 48.85, 2.35, 12.0).await.unwrap();
        client.notify(MapEvent::Loaded(handle)).await;
        client.add_merchants(ONE).await;

        let marker = client.with(|c| c.markers()[0].handle).await.unwrap();
        client.notify(MapEvent::MarkerPointerEnter(marker)).await;
        client.notify(MapEvent::MarkerPointerLeave(marker)).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        let visible = client
            .with(move |c| c.engine().marker(marker).unwrap().popup_visible)
            .await
            .unwrap();
        assert!(visible);

        tokio::time::sleep(Duration::from_millis(300)).await;
        let visible = client
            .with(move |c| c.engine().marker(marker).unwrap().popup_visible)
            .await
            .unwrap();
        assert!(!visible);
    }

    #[tokio::test]
    async fn test_surface_swallows_errors() {
        let (client, _task) = client();
        assert_eq!(client.initialize_mapbox("missing", 0.0, 0.0, 1.0).await, None);
        client.add_merchants(ONE).await;
        client.resize_map().await;
        client.cleanup_mapbox().await;
        client.clear_merchant_markers().await;

        let handle = client.with(|c| c.handle()).await.unwrap();
        assert_eq!(handle, None);
    }

    #[tokio::test]
    async fn test_driver_returns_controller_when_clients_drop() {
        let (client, task) = client();
        client.initialize_mapbox("map", 0.0, 0.0, 1.0).await.unwrap();
        drop(client);

        let controller = task.await.unwrap();
        assert!(controller.handle().is_some());
    }

    #[tokio::test]
    async fn test_stopped_driver_reports_error() {
        let (client, task) = client();
        task.abort();
        let _ = task.await;
        assert!(matches!(
            client.with(|c| c.handle()).await,
            Err(Error::DriverStopped)
        ));
    }
}
