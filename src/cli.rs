use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use inquire::Confirm;
use tracing::error;

use crate::config::Settings;
use crate::models::webhook::WebhookAction;
use crate::runtime::Services;
use crate::service::reconcile::ReconcileOutcome;
use crate::tasks::resync_loop::resync_tick;

#[derive(Parser)]
#[command(about = "Operator tools for field session bookings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one appointment from the scheduler and reconcile it.
    Reconcile {
        appointment_id: u64,
        #[arg(long, default_value = "appointment.changed")]
        action: String,
    },
    /// Reconcile every upcoming appointment.
    Resync {
        #[arg(long)]
        days: Option<u64>,
    },
    /// Show open dates for a month or open times for a date.
    Availability {
        #[arg(long, conflicts_with = "date", required_unless_present = "date")]
        month: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Cancel an appointment at the scheduler and locally.
    Cancel {
        appointment_id: u64,
        #[arg(long)]
        note: Option<String>,
        #[arg(long)]
        yes: bool,
    },
}

pub async fn cli(services: Services, settings: &Settings) {
    // Fine to exit on bad arguments here
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Reconcile {
            appointment_id,
            action,
        } => reconcile(&services, appointment_id, &action).await,
        Commands::Resync { days } => {
            resync(&services, days.unwrap_or(settings.resync_lookahead_days)).await
        }
        Commands::Availability { month, date } => {
            availability(&services, settings, month.as_deref(), date).await
        }
        Commands::Cancel {
            appointment_id,
            note,
            yes,
        } => cancel(&services, appointment_id, note.as_deref(), yes).await,
    };
    if let Err(e) = result {
        error!(error = %e, "command failed");
        println!("Error: {}", e);
    }
}

async fn reconcile(
    services: &Services,
    appointment_id: u64,
    action: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let appointment = services.scheduler.get_appointment(appointment_id).await?;
    let outcome = services
        .reconciler
        .reconcile_appointment(&appointment, &WebhookAction::parse(action), &HashMap::new())
        .await?;
    print_outcome(appointment_id, &outcome);
    Ok(())
}

async fn resync(services: &Services, days: u64) -> Result<(), Box<dyn std::error::Error>> {
    let report = resync_tick(
        &services.reconciler,
        services.scheduler.as_ref(),
        Utc::now(),
        days,
    )
    .await?;
    println!(
        "{} appointments: {} created, {} updated, {} unchanged, {} skipped, {} failed",
        report.seen, report.created, report.updated, report.unchanged, report.skipped, report.failed
    );
    Ok(())
}

async fn availability(
    services: &Services,
    settings: &Settings,
    month: Option<&str>,
    date: Option<NaiveDate>,
) -> Result<(), Box<dyn std::error::Error>> {
    let type_id = settings.acuity.appointment_type_id;
    if let Some(date) = date {
        let times = services.scheduler.available_times(date, type_id).await?;
        if times.is_empty() {
            println!("No open times on {}", date);
        }
        for slot in times {
            match slot.slots_available {
                Some(n) => println!("{} ({} open)", slot.time, n),
                None => println!("{}", slot.time),
            }
        }
    } else if let Some(month) = month {
        let dates = services.scheduler.available_dates(month, type_id).await?;
        if dates.is_empty() {
            println!("No open dates in {}", month);
        }
        for day in dates {
            println!("{}", day.date);
        }
    }
    Ok(())
}

async fn cancel(
    services: &Services,
    appointment_id: u64,
    note: Option<&str>,
    yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let appointment = services.scheduler.get_appointment(appointment_id).await?;
    if appointment.canceled {
        println!("Appointment {} is already canceled", appointment_id);
    } else {
        let who = appointment.client_name().unwrap_or_else(|| "unknown client".to_string());
        let when = appointment.datetime.clone().unwrap_or_default();
        if !yes && !confirm_cancel(appointment_id, &who, &when)? {
            println!("Left appointment {} as is", appointment_id);
            return Ok(());
        }
    }
    let canceled = if appointment.canceled {
        appointment
    } else {
        services
            .scheduler
            .cancel_appointment(appointment_id, note)
            .await?
    };
    let outcome = services
        .reconciler
        .reconcile_appointment(&canceled, &WebhookAction::Canceled, &HashMap::new())
        .await?;
    print_outcome(appointment_id, &outcome);
    Ok(())
}

fn confirm_cancel(appointment_id: u64, who: &str, when: &str) -> Result<bool, Box<dyn std::error::Error>> {
    Ok(Confirm::new(&format!(
        "Cancel appointment {} for {} at {}?",
        appointment_id, who, when
    ))
    .with_default(false)
    .prompt()?)
}

fn print_outcome(appointment_id: u64, outcome: &ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::Skipped(reason) => {
            println!("Appointment {}: skipped ({})", appointment_id, reason)
        }
        other => {
            if let Some(session) = other.session() {
                println!(
                    "Appointment {}: {} session {} [{}] {} {}",
                    appointment_id,
                    other.label(),
                    session.id,
                    session.status,
                    session.client_email,
                    session.starts_at.to_rfc3339()
                );
            }
        }
    }
}
