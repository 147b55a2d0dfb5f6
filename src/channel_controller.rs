use crate::{
    plugin::{sort_by_priority, CoreContext, ProcessContext, TelemetryPlugin},
    telemetry::TelemetryItem,
    Config, Error,
};
use std::{future::Future, pin::Pin, time::SystemTime};

/// Terminal stage of the processor chain. Hands every item to each channel queue.
#[derive(Debug, Default)]
pub(crate) struct ChannelController {
    queues: Vec<Vec<Box<dyn TelemetryPlugin>>>,
}

impl ChannelController {
    /// Explicit queues keep their identity; discovered channels form one additional queue.
    pub(crate) fn new(
        explicit: Vec<Vec<Box<dyn TelemetryPlugin>>>,
        discovered: Vec<Box<dyn TelemetryPlugin>>,
    ) -> Self {
        let mut queues: Vec<_> = explicit.into_iter().filter(|q| !q.is_empty()).collect();
        if !discovered.is_empty() {
            queues.push(discovered);
        }
        for queue in &mut queues {
            sort_by_priority(queue);
        }
        ChannelController { queues }
    }

    pub(crate) fn initialize(&mut self, config: &Config, ctx: &CoreContext) -> Result<(), Error> {
        for plugin in self.queues.iter_mut().flatten() {
            plugin.initialize(config, ctx)?;
        }
        Ok(())
    }

    /// Number of channel queues.
    pub(crate) fn len(&self) -> usize {
        self.queues.len()
    }

    /// Boxed, the future recurses through [`ProcessContext::process_next`].
    pub(crate) fn process_telemetry(
        &mut self,
        item: TelemetryItem,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if let Some((last, rest)) = self.queues.split_last_mut() {
                for queue in rest {
                    ProcessContext::new(queue, None)
                        .process_next(item.clone())
                        .await;
                }
                ProcessContext::new(last, None).process_next(item).await;
            }
        })
    }

    pub(crate) async fn flush(&mut self) {
        for plugin in self.queues.iter_mut().flatten() {
            plugin.flush().await;
        }
    }

    pub(crate) async fn unload_flush(&mut self) {
        for plugin in self.queues.iter_mut().flatten() {
            plugin.unload_flush().await;
        }
    }

    pub(crate) async fn poll_timers(&mut self) {
        for plugin in self.queues.iter_mut().flatten() {
            plugin.poll_timer().await;
        }
    }

    pub(crate) fn next_deadline(&self) -> Option<SystemTime> {
        self.queues
            .iter()
            .flatten()
            .filter_map(|p| p.next_deadline())
            .min()
    }

    pub(crate) fn teardown(&mut self) {
        for plugin in self.queues.iter_mut().flatten() {
            plugin.teardown();
        }
    }

    pub(crate) fn queues(&self) -> &[Vec<Box<dyn TelemetryPlugin>>] {
        &self.queues
    }

    pub(crate) fn queues_mut(&mut self) -> &mut [Vec<Box<dyn TelemetryPlugin>>] {
        &mut self.queues
    }
}
