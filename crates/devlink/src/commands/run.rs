//! `devlink run`: hold the link open until interrupted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use devlink_core::{
    Collaborators, Controller, ControllerEvent, Effector, IdentityStore, NoEffector,
};

use super::{identity_store, load_settings};
use crate::cli::{EventFormat, GlobalOpts, RunArgs};
use crate::effector::{CommandEffector, LogNotifier};
use crate::error::CliError;
use crate::output;

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = load_settings(global)?;
    let link = cfg.to_link_config()?;
    let store = Arc::new(identity_store(&cfg));

    if args.device.is_none() && store.get().is_none() {
        return Err(CliError::NoIdentity);
    }

    let effector: Arc<dyn Effector> = match cfg.effector.command {
        Some(ref command) => Arc::new(CommandEffector::new(
            command.clone(),
            Duration::from_secs(cfg.effector.timeout_secs),
        )),
        None => Arc::new(NoEffector),
    };
    let deps = Collaborators::new(store)
        .with_effector(effector)
        .with_notifications(Arc::new(LogNotifier));

    info!(server = %link.endpoint, "starting link");
    let controller = Controller::spawn(link, deps);
    let printer = spawn_printer(&controller, args.output);

    let started = match args.device {
        Some(ref code) => controller.update_identity(code).await,
        None => controller.connect().await,
    };
    if let Err(e) = started {
        controller.shutdown().await;
        printer.abort();
        return Err(e.into());
    }

    tokio::signal::ctrl_c().await?;
    info!("interrupted, disconnecting");
    if let Err(e) = controller.disconnect().await {
        warn!(error = %e, "disconnect failed");
    }
    controller.shutdown().await;
    // Last sender goes with the handle; the printer drains and exits.
    drop(controller);
    if let Err(e) = printer.await {
        debug!(error = %e, "event printer ended abnormally");
    }
    Ok(())
}

fn spawn_printer(controller: &Controller, format: EventFormat) -> JoinHandle<()> {
    let mut events = controller.events();
    let color = output::should_color();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(format, &event, color),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event printer fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_event(format: EventFormat, event: &ControllerEvent, color: bool) {
    match output::render_event(format, event, chrono::Local::now(), color) {
        Ok(line) => output::print_line(&line),
        Err(e) => warn!(error = %e, "cannot render event"),
    }
}
