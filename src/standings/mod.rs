use crate::models::Poll;
use std::collections::HashMap;

/// Where one option stands right now.
#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    pub option_id: String,
    pub option_text: String,
    pub votes: u64,
    /// Share of all votes, in percent with one decimal.
    pub share: f64,
    /// Votes per second over the momentum window.
    pub rate: f64,
}

#[derive(Debug, Clone)]
pub struct Standings {
    pub rows: Vec<Standing>,
    pub total_votes: u64,
    /// `None` when nobody voted yet or the top options are tied.
    pub leader: Option<String>,
}

/// Ranks the poll's options by current tally, most votes first.
///
/// Tallies missing from `tallies` fall back to the counts stored on the poll.
pub fn calculate_standings(
    poll: &Poll,
    tallies: &HashMap<String, u64>,
    rates: &HashMap<String, f64>,
) -> Standings {
    let mut rows: Vec<Standing> = poll
        .options
        .iter()
        .map(|option| Standing {
            option_id: option.id.clone(),
            option_text: option.text.clone(),
            votes: tallies.get(&option.id).copied().unwrap_or(option.votes),
            share: 0.0,
            rate: rates.get(&option.id).copied().unwrap_or(0.0),
        })
        .collect();

    let total_votes: u64 = rows.iter().map(|row| row.votes).sum();
    if total_votes > 0 {
        for row in &mut rows {
            row.share = (row.votes as f64 * 1000.0 / total_votes as f64).round() / 10.0;
        }
    }

    // Stable sort keeps poll order among equal tallies.
    rows.sort_by(|a, b| b.votes.cmp(&a.votes));

    let leader = match rows.as_slice() {
        [first, second, ..] if first.votes == second.votes => None,
        [first, ..] if first.votes > 0 => Some(first.option_id.clone()),
        _ => None,
    };

    Standings {
        rows,
        total_votes,
        leader,
    }
}

impl Standings {
    pub fn summary(&self) -> String {
        if self.total_votes == 0 {
            return "No votes yet.".to_string();
        }

        let mut summary = String::new();
        for row in &self.rows {
            let is_leader = self.leader.as_deref() == Some(row.option_id.as_str());
            let line = if is_leader {
                format!("**{}**: {} votes ({}%) {:.1}/s", row.option_text, row.votes, row.share, row.rate)
            } else {
                format!("{}: {} votes ({}%) {:.1}/s", row.option_text, row.votes, row.share, row.rate)
            };
            summary.push_str(&line);
            summary.push('\n');
        }
        summary.push_str(&format!("\n{} votes in total.", self.total_votes));
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll() -> Poll {
        let mut poll = Poll::new("Tabs or spaces?".into(), vec!["Tabs".into(), "Spaces".into(), "Both".into()], None, None);
        poll.options[0].votes = 1;
        poll.options[1].votes = 3;
        poll
    }

    #[test]
    fn ranks_by_votes_with_shares() {
        let poll = poll();
        let mut rates = HashMap::new();
        rates.insert(poll.options[1].id.clone(), 0.4);

        let standings = calculate_standings(&poll, &HashMap::new(), &rates);

        assert_eq!(standings.total_votes, 4);
        assert_eq!(standings.rows[0].option_text, "Spaces");
        assert_eq!(standings.rows[0].share, 75.0);
        assert_eq!(standings.rows[0].rate, 0.4);
        assert_eq!(standings.rows[1].share, 25.0);
        assert_eq!(standings.rows[2].share, 0.0);
        assert_eq!(standings.leader.as_deref(), Some(poll.options[1].id.as_str()));
        assert!(standings.summary().starts_with("**Spaces**: 3 votes (75%) 0.4/s"));
    }

    #[test]
    fn live_tallies_override_stored_counts() {
        let poll = poll();
        let mut tallies = HashMap::new();
        tallies.insert(poll.options[0].id.clone(), 3);

        let standings = calculate_standings(&poll, &tallies, &HashMap::new());

        assert_eq!(standings.total_votes, 6);
        assert_eq!(standings.leader, None);
        assert_eq!(standings.rows[0].share, 50.0);
    }

    #[test]
    fn empty_poll_has_no_leader() {
        let poll = Poll::new("Q".into(), vec!["a".into(), "b".into()], None, None);
        let standings = calculate_standings(&poll, &HashMap::new(), &HashMap::new());
        assert_eq!(standings.leader, None);
        assert_eq!(standings.summary(), "No votes yet.");
    }
}
