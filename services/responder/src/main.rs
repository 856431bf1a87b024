//! Responder
//!
//! Terminal front end: one facility session, the background push worker and
//! the alert reconciler, driven by commands on stdin.

use std::sync::Arc;

use clap::Parser;
use common::config_loader::ConfigSource;
use common::service_bootstrap::print_startup_banner;
use common::ShutdownSignal;
use errors::ResponderError;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use responder::backend::HttpBackend;
use responder::bootstrap::{self, Args};
use responder::channel::{ConfiguredPushService, PushOutcome};
use responder::console::{ConsoleCommand, HELP};
use responder::domain::Resolution;
use responder::presenter::{ConsolePresenter, LogNotifier, TerminalSurface};
use responder::resolver::{self, IncidentResolver};
use responder::state_store::StateStore;
use responder::worker::NotificationAction;
use responder::{
    ChannelManager, DirectoryClient, PushWorker, PushWorkerHandle, ReconcilerActor,
    ResponderConfig, Session,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("{}", ResponderConfig::generate_default_config());
        return Ok(());
    }

    let source = args
        .config
        .clone()
        .map(ConfigSource::with_file)
        .unwrap_or_default();
    let config = ResponderConfig::load(&source)?;

    bootstrap::initialize_logging(&args, &config)?;
    let service_info = bootstrap::service_info();
    if !args.no_color {
        print_startup_banner(&service_info);
    }
    info!(backend = %config.backend.base_url, resolver = ?config.resolver.mode, "Configuration loaded");

    let shutdown = ShutdownSignal::new();
    let _signal_task = shutdown.listen();
    let token = shutdown.token();

    // Components
    let backend = Arc::new(HttpBackend::new(&config.backend)?);
    let resolver = resolver::build_resolver(&config.resolver, backend.clone())?;
    let presenter = Arc::new(ConsolePresenter::new(
        resolver.clone(),
        config.alerts.preview_chars,
    ));
    let (reconciler, reconciler_task) =
        ReconcilerActor::spawn(config.alerts.expiry(), presenter, token.clone());

    let (worker, worker_task) =
        PushWorker::new(Arc::new(LogNotifier), Arc::new(TerminalSurface)).spawn(token.clone());
    worker.surface_ready(reconciler.clone()).await?;

    let channel = ChannelManager::new(
        Arc::new(ConfiguredPushService::new(
            config.push.subscription.clone(),
            worker.ready(),
        )),
        backend.clone(),
        config.push.public_key.clone(),
        config.push.activation_timeout(),
    );
    let directory = Arc::new(DirectoryClient::new(backend.clone()));
    let mut session = Session::new(
        directory,
        backend.clone(),
        channel,
        reconciler.clone(),
        StateStore::new(config.state.path.clone()),
        &config.polling,
        token.clone(),
    );

    // Initial selection
    let selected = match &args.facility {
        Some(name) => session.select_facility(name).await.map(Some),
        None => session.resume().await,
    };
    match selected {
        Ok(Some(facility)) => {
            if args.enable_push {
                match session.enable_push().await {
                    Ok(outcome) => report_push(outcome),
                    Err(e) => report_error(&e),
                }
            }
            info!(facility = %facility.name, "Monitoring alerts");
        },
        Ok(None) => info!("No facility selected, use 'select <name>' ('help' lists commands)"),
        Err(e) => warn!("Initial selection failed: {}", e),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            () = token.cancelled() => break,
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match line.parse::<ConsoleCommand>() {
                Ok(ConsoleCommand::Quit) => break,
                Ok(command) => run_command(&mut session, &worker, resolver.as_ref(), command).await,
                Err(e) => report_error(&e),
            },
            // stdin closed: keep serving until a signal arrives
            Ok(None) => {
                token.cancelled().await;
                break;
            },
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                token.cancelled().await;
                break;
            },
        }
    }

    info!("Shutting down");
    session.stop().await;
    let _ = worker.surface_closed().await;
    shutdown.trigger();
    let _ = tokio::join!(reconciler_task, worker_task);
    info!("Responder stopped");
    Ok(())
}

async fn run_command(
    session: &mut Session,
    worker: &PushWorkerHandle,
    resolver: &dyn IncidentResolver,
    command: ConsoleCommand,
) {
    let result = match command {
        ConsoleCommand::Facilities => session.directory().list_facilities().await.map(|facilities| {
            if facilities.is_empty() {
                println!("No facilities registered");
            }
            for facility in facilities {
                println!(
                    "  {} ({}) - {}, {}",
                    facility.name, facility.category, facility.location, facility.region
                );
            }
        }),
        ConsoleCommand::Select(name) => session
            .select_facility(&name)
            .await
            .map(|f| println!("Monitoring {}", f.name)),
        ConsoleCommand::Clear => session.clear_selection().await,
        ConsoleCommand::Register {
            name,
            location,
            region,
            category,
        } => session
            .directory()
            .register_facility(&name, &location, &region, &category)
            .await
            .map(|f| println!("Registered {} ({})", f.name, f.category)),
        ConsoleCommand::EnablePush => session.enable_push().await.map(report_push),
        ConsoleCommand::Deliver(raw) => worker.push(raw).await,
        ConsoleCommand::PushGone(status) => session
            .push_endpoint_rejected(status)
            .map(|()| println!("Push subscription dropped, polling only")),
        ConsoleCommand::View => worker.action(NotificationAction::View).await,
        ConsoleCommand::CloseNotification => worker.action(NotificationAction::Dismiss).await,
        ConsoleCommand::Dismiss => session.dismiss().await,
        ConsoleCommand::Resolve(location) => {
            match resolver.resolve(&location).await {
                Resolution::Found(incident) => {
                    println!(
                        "{} ({:.4}, {:.4})",
                        incident.display_name, incident.coordinates.lat, incident.coordinates.lon
                    );
                    if incident.facilities.is_empty() {
                        println!("  No emergency facilities found nearby");
                    }
                    for facility in &incident.facilities {
                        println!(
                            "  {:.1} km  {} ({})",
                            facility.distance_km, facility.name, facility.category_label
                        );
                    }
                },
                Resolution::NotFound => println!("Location not found"),
            }
            Ok(())
        },
        ConsoleCommand::Status => session.status().await.and_then(|status| {
            let rendered = serde_json::to_string_pretty(&status)?;
            println!("{}\nchannel: {:?}", rendered, status.channel);
            Ok(())
        }),
        ConsoleCommand::Help => {
            println!("{}", HELP);
            Ok(())
        },
        ConsoleCommand::Quit => Ok(()),
    };

    if let Err(e) = result {
        report_error(&e);
    }
}

fn report_push(outcome: PushOutcome) {
    match outcome {
        PushOutcome::Subscribed => info!("Push notifications enabled"),
        PushOutcome::NotConfigured => info!("Push is not configured on this deployment, polling only"),
        PushOutcome::PermissionDenied => warn!("Push permission denied, polling only"),
        PushOutcome::PermissionPending => info!("Push permission not granted yet, polling only"),
        PushOutcome::Failed(reason) => warn!("Push unavailable ({}), polling only", reason),
    }
}

fn report_error(error: &ResponderError) {
    let info = error.to_error_info();
    if error.is_user_correctable() {
        println!("{}", info.message);
    } else {
        warn!(code = %info.code, "{}", info.message);
    }
}
