use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    ChangeReturnFailedEvent,
    EventHandler,
    EventProducer,
    Handler,
    PaymentSucceededEvent,
    PaymentTimedOutEvent,
};

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The publishing side of the configured hooks. Cheap to clone; every payment watcher gets a copy.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub payment_succeeded_producer: Vec<EventProducer<PaymentSucceededEvent>>,
    pub payment_timed_out_producer: Vec<EventProducer<PaymentTimedOutEvent>>,
    pub change_return_failed_producer: Vec<EventProducer<ChangeReturnFailedEvent>>,
}

impl EventProducers {
    pub async fn publish_payment_succeeded(&self, event: PaymentSucceededEvent) {
        for producer in &self.payment_succeeded_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_payment_timed_out(&self, event: PaymentTimedOutEvent) {
        for producer in &self.payment_timed_out_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_change_return_failed(&self, event: ChangeReturnFailedEvent) {
        for producer in &self.change_return_failed_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_payment_succeeded: Option<EventHandler<PaymentSucceededEvent>>,
    pub on_payment_timed_out: Option<EventHandler<PaymentTimedOutEvent>>,
    pub on_change_return_failed: Option<EventHandler<ChangeReturnFailedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_payment_succeeded = hooks.on_payment_succeeded.map(|f| EventHandler::new(buffer_size, f));
        let on_payment_timed_out = hooks.on_payment_timed_out.map(|f| EventHandler::new(buffer_size, f));
        let on_change_return_failed = hooks.on_change_return_failed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_payment_succeeded, on_payment_timed_out, on_change_return_failed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_payment_succeeded {
            result.payment_succeeded_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_timed_out {
            result.payment_timed_out_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_change_return_failed {
            result.change_return_failed_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns a task per configured hook. Each task ends once every producer handed out by [`Self::producers`] has
    /// been dropped.
    pub fn start_handlers(self) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::with_capacity(3);
        if let Some(handler) = self.on_payment_succeeded {
            handles.push(tokio::spawn(handler.start_handler()));
        }
        if let Some(handler) = self.on_payment_timed_out {
            handles.push(tokio::spawn(handler.start_handler()));
        }
        if let Some(handler) = self.on_change_return_failed {
            handles.push(tokio::spawn(handler.start_handler()));
        }
        handles
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_payment_succeeded: Option<Handler<PaymentSucceededEvent>>,
    pub on_payment_timed_out: Option<Handler<PaymentTimedOutEvent>>,
    pub on_change_return_failed: Option<Handler<ChangeReturnFailedEvent>>,
}

impl EventHooks {
    pub fn on_payment_succeeded<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentSucceededEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_payment_succeeded = Some(Arc::new(f));
        self
    }

    pub fn on_payment_timed_out<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentTimedOutEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_payment_timed_out = Some(Arc::new(f));
        self
    }

    pub fn on_change_return_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ChangeReturnFailedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_change_return_failed = Some(Arc::new(f));
        self
    }
}
