use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use kube::{
    api::ListParams,
    runtime::{
        controller::Action,
        events::{Event, EventType, Recorder, Reporter},
        finalizer::{finalizer, Event as Finalizer},
        watcher::Config,
        Controller,
    },
    Api, Client, Resource, ResourceExt,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, field, info, instrument, warn, Span};

use crate::{
    connection::{ConnectionPublisher, SecretPublisher},
    reconcilers::{Context, ManagedResource, Outcome, Reconciler, Siblings},
    resources::{Subscription, Topic},
    sns::Connector,
    store::KubeStore,
    telemetry, Error, ErrorClass, Metrics, Result,
};

pub const FINALIZER: &str = "sns.aws.crossplane.io/finalizer";

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}
impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: "sns-operator".into(),
        }
    }
}
impl Diagnostics {
    pub fn recorder<K: Resource<DynamicType = ()>>(&self, client: Client, obj: &K) -> Recorder {
        Recorder::new(client, self.reporter.clone(), obj.object_ref(&()))
    }
}

/// State shared between the controller and the web server
#[derive(Clone, Default)]
pub struct State {
    /// Diagnostics populated by the reconciler
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    registry: prometheus::Registry,
}

/// State wrapper around the controller outputs for the web server
impl State {
    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    // Create a Controller Context that can update State
    pub(crate) fn to_context(
        &self,
        client: Client,
        connector: Arc<dyn Connector>,
        poll_interval: Duration,
    ) -> Result<Arc<Context>, prometheus::Error> {
        let publisher: Arc<dyn ConnectionPublisher> = Arc::new(SecretPublisher::new(client.clone()));
        Ok(Arc::new(Context {
            client,
            metrics: Metrics::default().register(&self.registry)?,
            diagnostics: self.diagnostics.clone(),
            connector,
            publisher,
            poll_interval,
        }))
    }
}

/// How long to wait before retrying a failed reconcile
fn backoff(class: ErrorClass) -> Duration {
    match class {
        ErrorClass::Transient => Duration::from_secs(5),
        ErrorClass::Permanent => Duration::from_secs(60),
        ErrorClass::InvalidSpec => Duration::from_secs(5 * 60),
    }
}

// Error handler for failed reconciliations
fn error_policy<K: ManagedResource>(obj: Arc<K>, error: &Error, ctx: Arc<Context>) -> Action {
    let class = error.classify();
    warn!(name = %obj.name_any(), ?class, "reconcile failed: {error}");
    ctx.metrics.reconcile_failure(obj.as_ref(), error);
    Action::requeue(backoff(class))
}

pub struct SnsController {
    state: State,
}

impl SnsController {
    pub fn new(state: State) -> Self {
        Self { state }
    }

    /// Initialize the controllers and shared state (given the crds are installed)
    pub async fn run(
        self,
        connector: Arc<dyn Connector>,
        poll_interval: Duration,
    ) -> Result<(), anyhow::Error> {
        // Get a k8s client for communicating with the cluster
        let client = Client::try_default().await?;

        // Test that we can actually query for our CRDs (a.k.a. they are installed)
        let topics = Api::<Topic>::all(client.clone());
        let subscriptions = Api::<Subscription>::all(client.clone());
        if let Err(e) = topics.list(&ListParams::default().limit(1)).await {
            error!("Topic CRD is not queryable; {e:?}. Is the CRD installed?");
            info!("Installation: cargo run --bin crdgen | kubectl apply -f -");
            anyhow::bail!("Topic CRD is not installed");
        }
        if let Err(e) = subscriptions.list(&ListParams::default().limit(1)).await {
            error!("Subscription CRD is not queryable; {e:?}. Is the CRD installed?");
            anyhow::bail!("Subscription CRD is not installed");
        }

        let ctx = self.state.to_context(client, connector, poll_interval)?;
        let watching_config = Config::default().page_size(50).any_semantic();

        let topics = Controller::new(topics, watching_config.clone())
            .shutdown_on_signal()
            .run(reconcile::<Topic>, error_policy::<Topic>, ctx.clone())
            .filter_map(|x| async move { Result::ok(x) })
            .for_each(|_| futures::future::ready(()));
        let subscriptions = Controller::new(subscriptions, watching_config)
            .shutdown_on_signal()
            .run(reconcile::<Subscription>, error_policy::<Subscription>, ctx)
            .filter_map(|x| async move { Result::ok(x) })
            .for_each(|_| futures::future::ready(()));

        futures::join!(topics, subscriptions);

        Ok(())
    }
}

/// Reconciler for every managed SNS kind
#[instrument(skip(ctx, obj), fields(trace_id, kind = %K::kind(&())))]
async fn reconcile<K: ManagedResource>(obj: Arc<K>, ctx: Arc<Context>) -> Result<Action> {
    // Add some tracing for debugging's sake
    let trace_id = telemetry::get_trace_id();

    // Take some metrics to see the average reconcile time
    Span::current().record("trace_id", &field::display(&trace_id));
    let _timer = ctx.metrics.count_and_measure();
    ctx.diagnostics.write().await.last_event = Utc::now();

    let name = obj.name_any();
    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::IllegalResource(name.clone(), "missing namespace".into()))?;
    let api = Api::<K>::namespaced(ctx.client.clone(), &namespace);

    info!(r#"Starting {} reconciliation for "{namespace}/{name}""#, K::kind(&()));
    finalizer(&api, FINALIZER, obj, |event| async {
        match event {
            Finalizer::Apply(obj) => apply(obj, &namespace, ctx.clone()).await,
            Finalizer::Cleanup(obj) => cleanup(obj, &namespace, ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| Error::FinalizerError(Box::new(e)))
}

async fn apply<K: ManagedResource>(obj: Arc<K>, namespace: &str, ctx: Arc<Context>) -> Result<Action> {
    let store = KubeStore::<K>::namespaced(ctx.client.clone(), namespace);
    let siblings = Siblings::namespaced(ctx.client.clone(), namespace);
    let reconciler = Reconciler {
        connector: ctx.connector.as_ref(),
        store: &store,
        siblings: &siblings,
        publisher: ctx.publisher.as_ref(),
    };

    let mut obj = Arc::unwrap_or_clone(obj);
    let outcome = reconciler.apply(&mut obj).await?;
    if outcome == Outcome::Created {
        let recorder = ctx.diagnostics.read().await.recorder(ctx.client.clone(), &obj);
        recorder
            .publish(Event {
                type_: EventType::Normal,
                reason: "CreatedExternalResource".into(),
                note: Some(format!("Created `{}`", obj.name_any())),
                action: "Creating".into(),
                secondary: None,
            })
            .await?;
    }

    Ok(Action::requeue(outcome.requeue_after(ctx.poll_interval)))
}

// Finalizer cleanup (the object was deleted, ensure nothing is orphaned unless asked to)
async fn cleanup<K: ManagedResource>(obj: Arc<K>, namespace: &str, ctx: Arc<Context>) -> Result<Action> {
    let store = KubeStore::<K>::namespaced(ctx.client.clone(), namespace);
    let siblings = Siblings::namespaced(ctx.client.clone(), namespace);
    let reconciler = Reconciler {
        connector: ctx.connector.as_ref(),
        store: &store,
        siblings: &siblings,
        publisher: ctx.publisher.as_ref(),
    };

    let mut obj = Arc::unwrap_or_clone(obj);
    reconciler.cleanup(&mut obj).await?;

    let recorder = ctx.diagnostics.read().await.recorder(ctx.client.clone(), &obj);
    recorder
        .publish(Event {
            type_: EventType::Normal,
            reason: "DeleteRequested".into(),
            note: Some(format!("Delete `{}`", obj.name_any())),
            action: "Deleting".into(),
            secondary: None,
        })
        .await?;

    Ok(Action::await_change())
}
