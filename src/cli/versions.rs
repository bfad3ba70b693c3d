use crate::cli::signed_in_session;
use rewind::di::ServiceContainer;
use rewind::resolver::{Resolution, ResolutionStrategy, VersionResolver};
use rewind::store::{AppId, StoreSession};
use rewind::RewindResult;
use std::sync::Arc;

pub fn strategy_for(history: bool) -> ResolutionStrategy {
    if history {
        ResolutionStrategy::RemoteHistory
    } else {
        ResolutionStrategy::Device
    }
}

/// Flag that selects `strategy` on the command line
pub fn strategy_flag(strategy: ResolutionStrategy) -> &'static str {
    match strategy {
        ResolutionStrategy::Device => "without --history",
        ResolutionStrategy::RemoteHistory => "with --history",
    }
}

pub async fn run(link: String, history: bool) -> RewindResult<()> {
    let container = ServiceContainer::new()?;
    let app_id = AppId::parse(&link)?;
    let strategy = strategy_for(history);

    // The history service is public; only the marketplace list needs a sign-in
    let session = match strategy {
        ResolutionStrategy::Device => signed_in_session(&container).await?,
        ResolutionStrategy::RemoteHistory => StoreSession::new(Arc::clone(&container.marketplace)),
    };

    let resolver = VersionResolver::new(Arc::clone(&container.history));
    let resolution = resolver.resolve(strategy, &app_id, &session).await?;
    print!("{}", render(&app_id, strategy, &resolution));
    Ok(())
}

pub fn render(app_id: &AppId, strategy: ResolutionStrategy, resolution: &Resolution) -> String {
    match resolution {
        Resolution::Candidates(candidates) => {
            let mut out = format!("Releases of app {} ({}):\n", app_id, strategy);
            for candidate in candidates {
                out.push_str(&format!(
                    "  {:>12}  {}\n",
                    candidate.release_id, candidate.display_version
                ));
            }
            out
        }
        Resolution::NoHistoryAvailable => format!(
            "No releases of app {} found via the {}. Try again {}.\n",
            app_id,
            strategy,
            strategy_flag(strategy.other())
        ),
    }
}
