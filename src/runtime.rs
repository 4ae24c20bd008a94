use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use warp::Filter;

use crate::clients::acuity_client::AcuityClient;
use crate::clients::supabase_client::SupabaseClient;
use crate::config::{ConfigError, Settings, StoreKind};
use crate::events::queue::EventBus;
use crate::events::worker;
use crate::handlers::{self, AppState, rejection};
use crate::service::booking::BookingService;
use crate::service::reconcile::Reconciler;
use crate::service::scheduling::{SchedulerError, SchedulingClient};
use crate::service::session_store::{MemorySessionStore, SessionStore, StoreError};
use crate::tasks::resync_loop;
use crate::tasks::task_runner::TaskRunner;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The long-lived clients both run modes share.
pub struct Services {
    pub scheduler: Arc<dyn SchedulingClient>,
    pub store: Arc<dyn SessionStore>,
    pub reconciler: Arc<Reconciler>,
    pub supabase: Option<Arc<SupabaseClient>>,
}

pub fn build_services(settings: &Settings) -> Result<Services, StartupError> {
    let acuity = &settings.acuity;
    let scheduler: Arc<dyn SchedulingClient> = Arc::new(
        AcuityClient::new(&acuity.base_url, &acuity.user_id, &acuity.api_key)?
            .with_calendar_id(acuity.calendar_id),
    );

    let supabase = match &settings.supabase {
        Some(cfg) => Some(Arc::new(
            SupabaseClient::new(&cfg.url, &cfg.service_key)?
                .with_tables(&cfg.sessions_table, &cfg.profiles_table),
        )),
        None => None,
    };

    let store: Arc<dyn SessionStore> = match (settings.store, &supabase) {
        (StoreKind::Supabase, Some(client)) => client.clone(),
        (StoreKind::Supabase, None) => return Err(ConfigError::Missing("SUPABASE_URL").into()),
        (StoreKind::Memory, _) => {
            info!(path = %settings.db_location.display(), "using local session store");
            Arc::new(MemorySessionStore::persistent(&settings.db_location)?)
        }
    };

    let reconciler = Arc::new(Reconciler::new(
        scheduler.clone(),
        store.clone(),
        settings.timezone,
    ));
    Ok(Services {
        scheduler,
        store,
        reconciler,
        supabase,
    })
}

pub async fn run_api(settings: Settings) -> Result<(), StartupError> {
    let services = build_services(&settings)?;
    let auth = services
        .supabase
        .clone()
        .ok_or(ConfigError::Missing("SUPABASE_URL"))?;

    let (bus, rx) = EventBus::new(settings.event_buffer);
    let booking = Arc::new(BookingService::new(
        services.scheduler.clone(),
        services.store.clone(),
        services.reconciler.clone(),
        settings.acuity.appointment_type_id,
        settings.acuity.calendar_id,
    ));

    let mut task_runner = TaskRunner::new();
    task_runner.add_task("event_worker", {
        let reconciler = services.reconciler.clone();
        move || {
            tokio::spawn(async move {
                worker::run_event_worker(rx, reconciler).await;
            });
        }
    });
    match settings.resync_interval {
        Some(interval) => task_runner.add_task("resync_loop", {
            let reconciler = services.reconciler.clone();
            let scheduler = services.scheduler.clone();
            let days = settings.resync_lookahead_days;
            move || {
                tokio::spawn(async move {
                    resync_loop::run_resync_loop(reconciler, scheduler, interval, days).await;
                });
            }
        }),
        None => info!("resync loop disabled"),
    }
    task_runner.start_all();

    let state = Arc::new(AppState {
        bus,
        booking,
        auth,
        webhook_token: settings.webhook_token.clone(),
    });
    let routes = handlers::routes(state).recover(rejection::handle_rejection);

    info!(addr = %settings.bind_addr, timezone = %settings.timezone, "listening");
    warp::serve(routes).run(settings.bind_addr).await;
    Ok(())
}
