use crate::cli::input::{DialoguerInput, UserInput};
use crate::cli::signed_in_session;
use crate::cli::versions::strategy_for;
use rewind::delivery::InstallTrigger;
use rewind::di::ServiceContainer;
use rewind::orchestrator::{DowngradeOrchestrator, DowngradeState};
use rewind::resolver::Resolution;
use rewind::{RewindError, RewindResult};
use tokio::sync::oneshot;

pub const SWITCH_PROMPT: &str = "No releases found. Try the other release source?";
pub const SELECT_PROMPT: &str = "Release to install";

pub struct DowngradeOptions {
    pub link: String,
    pub history: bool,
    pub release: Option<String>,
}

pub async fn run(options: DowngradeOptions) -> RewindResult<()> {
    let container = ServiceContainer::new()?;
    let session = signed_in_session(&container).await?;
    let mut orchestrator = DowngradeOrchestrator::new(&container, session)?;

    let mut states = orchestrator.subscribe();
    let progress = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            match state {
                DowngradeState::Fetching { .. }
                | DowngradeState::Packaging { .. }
                | DowngradeState::Serving => println!("→ {}", state.name()),
                _ => {}
            }
        }
    });

    let result = drive(&mut orchestrator, options).await;
    progress.abort();

    if result.is_ok() {
        println!("✓ Downgrade finished");
    }
    result
}

async fn drive(
    orchestrator: &mut DowngradeOrchestrator,
    options: DowngradeOptions,
) -> RewindResult<()> {
    let trigger = prepare(orchestrator, &DialoguerInput, options).await?;
    print_trigger(&trigger);
    wait_for_confirmation(orchestrator).await
}

/// Resolve, pick a release and start serving it
pub async fn prepare(
    orchestrator: &mut DowngradeOrchestrator,
    input: &dyn UserInput,
    options: DowngradeOptions,
) -> RewindResult<InstallTrigger> {
    let mut strategy = strategy_for(options.history);

    let mut switched = false;
    let candidates = loop {
        match orchestrator.submit(&options.link, strategy).await? {
            Resolution::Candidates(candidates) => break candidates,
            Resolution::NoHistoryAvailable => {
                if switched || !input.prompt_confirm(SWITCH_PROMPT, true)? {
                    return Err(RewindError::Input(format!(
                        "no releases found for {}",
                        options.link
                    )));
                }
                strategy = strategy.other();
                switched = true;
            }
        }
    };

    let release_id = match options.release {
        Some(release) => release,
        None => {
            let items: Vec<String> = candidates.iter().map(|c| c.to_string()).collect();
            let index = input.prompt_select(SELECT_PROMPT, &items, 0)?;
            candidates
                .get(index)
                .map(|c| c.release_id.clone())
                .ok_or_else(|| RewindError::Input(format!("no release at position {}", index)))?
        }
    };

    orchestrator.select(&release_id).await
}

fn print_trigger(trigger: &InstallTrigger) {
    println!();
    println!("Ready to install. On the device, open:");
    println!("  {}", trigger.install_page_url);
    println!();
    println!("or use the install link directly:");
    println!("  {}", trigger.itms_url);
    println!();
}

/// Enter finishes, Ctrl-C cancels
async fn wait_for_confirmation(orchestrator: &mut DowngradeOrchestrator) -> RewindResult<()> {
    println!("Press Enter once the install has finished (Ctrl-C to cancel).");

    // A plain thread: a pending stdin read must not hold up runtime shutdown
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = tx.send(std::io::stdin().read_line(&mut line));
    });

    tokio::select! {
        read = rx => match read {
            Ok(Ok(n)) if n > 0 => orchestrator.finish(),
            Ok(Ok(_)) => {
                orchestrator.abort()?;
                Err(RewindError::Input("stdin closed before the install was confirmed".to_string()))
            }
            Ok(Err(e)) => {
                orchestrator.abort()?;
                Err(e.into())
            }
            Err(_) => {
                orchestrator.abort()?;
                Err(RewindError::Cancelled)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            orchestrator.abort()?;
            Err(RewindError::Cancelled)
        }
    }
}
