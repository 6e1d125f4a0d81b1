//! Tasks the server registers on its own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{BackgroundTask, TaskContext};
use crate::limits::LimitsEngine;
use crate::registry::ConnectionRegistry;

/// Retries every interface and router stuck in `ATTEMPTING`.
pub struct ReconnectTask {
    registry: Arc<ConnectionRegistry>,
    delay: Duration,
}

impl ReconnectTask {
    pub const NAME: &'static str = "Interface Reconnect";

    pub fn new(registry: Arc<ConnectionRegistry>, delay: Duration) -> Self {
        Self { registry, delay }
    }
}

#[async_trait]
impl BackgroundTask for ReconnectTask {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn initial_status(&self) -> String {
        format!("Retrying links every {:?}", self.delay)
    }

    async fn run(&self, ctx: TaskContext) -> anyhow::Result<()> {
        let mut total = 0;
        while !ctx.sleep(self.delay).await {
            let connected = self.registry.retry_attempting();
            if connected > 0 {
                total += connected;
                debug!(connected, "Reconnected links");
                ctx.set_status(format!("Reconnected {total} link(s)"));
            }
        }
        Ok(())
    }
}

/// Periodically moves items of packets past their staleness window to `STALE`.
pub struct StalenessTask {
    limits: Arc<LimitsEngine>,
    interval: Duration,
}

impl StalenessTask {
    pub const NAME: &'static str = "Limits Staleness";

    pub fn new(limits: Arc<LimitsEngine>, interval: Duration) -> Self {
        Self { limits, interval }
    }
}

#[async_trait]
impl BackgroundTask for StalenessTask {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, ctx: TaskContext) -> anyhow::Result<()> {
        while !ctx.sleep(self.interval).await {
            let marked = self.limits.sweep_stale();
            if marked > 0 {
                ctx.set_status(format!("Marked {marked} packet(s) stale"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::demo_catalog;
    use crate::config::{HubConfig, InterfaceConfig, LimitsConfig};
    use crate::hub::Hub;
    use crate::registry::{LoopbackTransport, Transport, TransportMap};
    use crate::supervisor::Supervisor;
    use ctsd_types::{ConnectionState, TaskState};
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct LateTransport {
        ready: AtomicBool,
        inner: LoopbackTransport,
    }

    impl Transport for LateTransport {
        fn connect(&self) -> io::Result<()> {
            if self.ready.load(Ordering::SeqCst) {
                self.inner.connect()
            } else {
                Err(io::Error::new(io::ErrorKind::ConnectionRefused, "not yet"))
            }
        }

        fn disconnect(&self) {}

        fn write_raw(&self, bytes: &[u8]) -> io::Result<usize> {
            self.inner.write_raw(bytes)
        }
    }

    #[tokio::test]
    async fn reconnect_task_connects_recovered_interface() {
        let transport = Arc::new(LateTransport {
            ready: AtomicBool::new(false),
            inner: LoopbackTransport::new(),
        });
        let mut transports = TransportMap::new();
        transports.insert("INST_INT".into(), transport.clone());
        let registry = Arc::new(
            ConnectionRegistry::new(
                Arc::new(demo_catalog()),
                &[InterfaceConfig {
                    name: "INST_INT".into(),
                    targets: vec!["INST".into()],
                    auto_connect: true,
                }],
                &[],
                &transports,
            )
            .unwrap(),
        );
        registry.connect_auto();
        assert_eq!(registry.interface_state("INST_INT").unwrap(), ConnectionState::Attempting);

        let supervisor = Supervisor::new();
        supervisor
            .register(Arc::new(ReconnectTask::new(registry.clone(), Duration::from_millis(5))))
            .unwrap();
        supervisor.start_background_task(ReconnectTask::NAME).unwrap();

        transport.ready.store(true, Ordering::SeqCst);
        for _ in 0..200 {
            if registry.interface_state("INST_INT").unwrap() == ConnectionState::Connected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(registry.interface_state("INST_INT").unwrap(), ConnectionState::Connected);

        supervisor.stop_all(Duration::from_secs(1)).await;
        assert_eq!(supervisor.get_background_tasks()[0].state, TaskState::Complete);
    }

    #[tokio::test]
    async fn staleness_task_sweeps() {
        let hub = Arc::new(Hub::new(&HubConfig::default()));
        let config = LimitsConfig {
            staleness_window: Duration::from_millis(10),
            ..LimitsConfig::default()
        };
        let limits = Arc::new(LimitsEngine::new(&demo_catalog(), hub.clone(), &config).unwrap());
        limits
            .update_values("INST", "HEALTH_STATUS", &[("TEMP1", 0.0, 0.0)])
            .unwrap();
        limits.check_limits("INST", "HEALTH_STATUS").unwrap();
        let id = hub.subscribe_limits_events(None).unwrap();

        let supervisor = Supervisor::new();
        supervisor
            .register(Arc::new(StalenessTask::new(limits.clone(), Duration::from_millis(5))))
            .unwrap();
        supervisor.start_background_task(StalenessTask::NAME).unwrap();

        let event = hub
            .get_limits_event(id, Duration::from_secs(2))
            .await
            .unwrap()
            .expect("stale transition");
        assert_eq!(event.new_state, ctsd_types::LimitState::Stale);

        supervisor.stop_all(Duration::from_secs(1)).await;
        assert!(supervisor.get_background_tasks()[0].status.contains("stale"));
    }
}
