use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use console_core::{
    derive_stream_url, load_settings, CapturePhase, GestureBinding, GestureConsole, TrainingPhase,
    WorkflowNotice, TRAINING_STEPS,
};
use shared::domain::PREDEFINED_ACTIONS;

#[derive(Parser, Debug)]
#[command(name = "console", about = "Operator console for the gesture engine")]
struct Args {
    /// Engine request/response base, e.g. http://127.0.0.1:8000
    #[arg(long)]
    api_url: Option<String>,
    /// Engine push-stream base; derived from --api-url when omitted
    #[arg(long)]
    stream_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow connection status, live predictions, and gesture onsets
    Watch,
    /// List registered gestures and their action bindings
    Gestures,
    /// Register a gesture and record it on the engine camera
    Record {
        #[arg(long)]
        label: String,
        /// Custom command to bind; predefined registry derivation when omitted
        #[arg(long)]
        command: Option<String>,
    },
    /// Retrain the recognition model
    Train,
    /// Delete a gesture and its action binding
    Delete {
        #[arg(long)]
        label: String,
    },
    /// Print the predefined action registry
    Actions,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(api_url) = args.api_url {
        settings.stream_base_url = derive_stream_url(&api_url)?;
        settings.api_base_url = api_url;
    }
    if let Some(stream_url) = args.stream_url {
        settings.stream_base_url = stream_url;
    }

    if let Command::Actions = args.command {
        for label in PREDEFINED_ACTIONS {
            println!("{label}");
        }
        return Ok(());
    }

    let console = GestureConsole::connect(settings);
    let result = run(&console, args.command).await;
    console.close().await;
    result
}

async fn run(console: &GestureConsole, command: Command) -> Result<()> {
    match command {
        Command::Watch => watch(console).await,
        Command::Gestures => list_gestures(console).await,
        Command::Record { label, command } => record(console, label, command).await,
        Command::Train => train(console).await,
        Command::Delete { label } => {
            console.delete_gesture(&label).await?;
            println!("deleted {label}");
            Ok(())
        }
        Command::Actions => unreachable!("handled before connecting"),
    }
}

async fn watch(console: &GestureConsole) -> Result<()> {
    let mut status = console.connection_status();
    let mut activity = console.activity();
    println!("video feed: {}", console.video_feed_url());
    println!("connection: {:?}", *status.borrow());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("connection: {:?}", *status.borrow());
            }
            changed = activity.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = activity.borrow().clone();
                let mode = if snapshot.is_capturing { "capturing" } else { "monitoring" };
                match snapshot.history.first() {
                    Some(entry) => println!(
                        "[{mode}] {} (last onset {} at {})",
                        snapshot.current_label,
                        entry.label,
                        entry.observed_at.format("%H:%M:%S"),
                    ),
                    None => println!("[{mode}] {}", snapshot.current_label),
                }
            }
        }
    }
    Ok(())
}

async fn list_gestures(console: &GestureConsole) -> Result<()> {
    let health = console.engine_health().await?;
    println!("engine: {}", health.status);
    console.refresh_catalog().await?;
    let catalog = console.catalog().borrow().clone();
    if catalog.gestures.is_empty() {
        println!("no gestures registered");
        return Ok(());
    }
    for gesture in &catalog.gestures {
        match catalog.actions.get(gesture) {
            Some(binding) => {
                println!("{gesture}  [{:?}] {}", binding.kind, binding.command)
            }
            None => println!("{gesture}  (no action bound)"),
        }
    }
    Ok(())
}

async fn record(console: &GestureConsole, label: String, command: Option<String>) -> Result<()> {
    let binding = match command {
        Some(command) => GestureBinding::Custom { command },
        None => GestureBinding::Predefined,
    };
    let mut notices = console.notices();
    let mut capture = console.capture_state();
    console.start_capture(&label, binding).await?;

    loop {
        capture.changed().await?;
        let state = capture.borrow().clone();
        match state.phase {
            CapturePhase::Registering => println!("registering action binding..."),
            CapturePhase::Capturing => {
                println!("recording {label}; hold the gesture steady")
            }
            CapturePhase::Settled => {
                println!("gesture {label} captured");
                return Ok(());
            }
            CapturePhase::Failed => {
                let reason = failure_reason(&mut notices).await;
                bail!("capture failed: {reason}");
            }
            CapturePhase::Idle => {}
        }
    }
}

async fn train(console: &GestureConsole) -> Result<()> {
    let mut training = console.training_state();
    let mut notices = console.notices();
    console.start_training().await?;

    let mut last_step = usize::MAX;
    loop {
        training.changed().await?;
        let state = training.borrow().clone();
        if state.phase == TrainingPhase::Running && state.step_index != last_step {
            last_step = state.step_index;
            println!(
                "[{}/{}] {}",
                state.step_index + 1,
                TRAINING_STEPS.len(),
                state.step_name(),
            );
        }
        match state.phase {
            TrainingPhase::Succeeded => {
                println!("model weights synchronized");
                return Ok(());
            }
            TrainingPhase::Failed => {
                let reason = failure_reason(&mut notices).await;
                bail!("training failed: {reason}");
            }
            _ => {}
        }
    }
}

async fn failure_reason(
    notices: &mut tokio::sync::broadcast::Receiver<WorkflowNotice>,
) -> String {
    let found = tokio::time::timeout(std::time::Duration::from_millis(250), async {
        loop {
            match notices.recv().await {
                Ok(WorkflowNotice::CaptureFailed { reason, .. })
                | Ok(WorkflowNotice::TrainingFailed { reason }) => break reason,
                Ok(_) => {}
                Err(_) => break "see engine logs".to_string(),
            }
        }
    })
    .await;
    found.unwrap_or_else(|_| "see engine logs".to_string())
}
