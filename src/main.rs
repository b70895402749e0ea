use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use versus_momentum::backend::memory::InMemoryBackend;
use versus_momentum::backend::{StaticIp, VoteBackend};
use versus_momentum::clock::SystemClock;
use versus_momentum::config::AppConfig;
use versus_momentum::db::Database;
use versus_momentum::models::Poll;
use versus_momentum::standings::calculate_standings;
use versus_momentum::tasks::{poll_ender, tally_listener};
use versus_momentum::{Collaborators, VoteError, VoteReconciler};

const CROWD_SIZE: usize = 12;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    let database = match Database::new(&config.database_url).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return;
        }
    };

    let mut poll = Poll::new(
        "Which is the better breakfast?".to_string(),
        vec!["Pancakes".to_string(), "Waffles".to_string()],
        None,
        Some(5),
    );
    // Demo polls run for seconds, not minutes.
    poll.ends_at = Some(poll.created_at + chrono::Duration::seconds(config.demo_duration.as_secs() as i64));

    let backend = Arc::new(InMemoryBackend::for_poll(&poll));
    let updates = backend.subscribe();

    let collaborators = Collaborators {
        backend: backend.clone(),
        store: database.clone(),
        ip_resolver: Arc::new(StaticIp("127.0.0.1".to_string())),
        clock: Arc::new(SystemClock),
    };
    let reconciler = match VoteReconciler::open(&poll, config.session.clone(), collaborators).await {
        Ok(reconciler) => Arc::new(reconciler),
        Err(e) => {
            error!("Failed to open voting session: {}", e);
            return;
        }
    };

    // --- Start Background Tasks ---
    tokio::spawn(tally_listener::run_tally_listener(Arc::clone(&reconciler), updates));
    let expiry = tokio::spawn(poll_ender::watch_poll_expiry(
        Arc::clone(&reconciler),
        config.expiry_check,
    ));
    tokio::spawn(simulate_crowd(backend.clone(), poll.clone()));
    tokio::spawn(simulate_local_voter(Arc::clone(&reconciler), poll.clone()));

    let mut report = tokio::time::interval(Duration::from_secs(1));
    while reconciler.is_open() {
        report.tick().await;
        let rates: HashMap<String, f64> = reconciler.momentum().into_iter().collect();
        let standings = calculate_standings(&poll, &reconciler.tallies(), &rates);
        let left = reconciler
            .time_remaining()
            .map(|left| left.to_string())
            .unwrap_or_else(|| "ended".to_string());
        info!("{} ({} left)\n{}", poll.question, left, standings.summary());
    }

    if let Err(e) = expiry.await {
        warn!("Expiry watcher stopped abnormally: {}", e);
    }

    match database.poll_total(&poll.id).await {
        Ok(total) => info!("You voted {} time(s) on this poll.", total),
        Err(e) => error!("Failed to read contribution ledger: {}", e),
    }
}

// Other voters hitting the backend directly; their votes only reach the
// session through the tally feed.
async fn simulate_crowd(backend: Arc<InMemoryBackend>, poll: Poll) {
    let mut ticker = tokio::time::interval(Duration::from_millis(350));
    let mut round = 0usize;

    loop {
        ticker.tick().await;
        round += 1;
        let voter = format!("crowd-{}", round % CROWD_SIZE);
        // Waffles get a burst every fourth round.
        let option = if round % 4 == 0 { &poll.options[1] } else { &poll.options[round % 2] };

        if let Err(e) = backend.cast_vote(&poll.id, &option.id, &voter, "192.0.2.1").await {
            match VoteError::from_rejection(&e.message) {
                VoteError::PollClosed => return,
                VoteError::LimitReached => continue,
                other => warn!("Crowd vote failed: {}", other),
            }
        }
    }
}

async fn simulate_local_voter(reconciler: Arc<VoteReconciler>, poll: Poll) {
    let mut ticker = tokio::time::interval(Duration::from_millis(1200));

    loop {
        ticker.tick().await;
        // A double click: the second gesture is debounced.
        let first = reconciler.register_vote(&poll.options[0].id);
        let second = reconciler.register_vote(&poll.options[0].id);
        let (first, second) = tokio::join!(first, second);

        for outcome in [first, second] {
            match outcome {
                Ok(()) => {}
                Err(e) if e.is_silent() => {}
                Err(VoteError::PollClosed) => return,
                Err(e) => {
                    if let Some(message) = e.user_message() {
                        info!("Status: {}", message);
                    }
                    if e == VoteError::LimitReached {
                        return;
                    }
                }
            }
        }
    }
}
