//! Tallying over decrypted selection codes.
//!
//! The tally sees only anonymous selection sets coming out of the mix-net
//! cascade; there is nothing left to link a count to a submitter. Totals
//! are kept in insertion order matching the election definition so the
//! serialized tally, and therefore its commitment, is deterministic.

use crate::*;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::warn;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TallyResult {
    pub election_id: String,
    pub ballot_count: usize,

    /// contest id -> option id -> count, in election-definition order.
    pub totals: IndexMap<String, IndexMap<String, u64>>,

    pub tallied_at: DateTime<Utc>,
}

fn empty_totals(election: &Election) -> IndexMap<String, IndexMap<String, u64>> {
    election
        .contests
        .iter()
        .map(|contest| {
            let options = contest
                .options
                .iter()
                .map(|option| (option.id.clone(), 0u64))
                .collect();
            (contest.id.clone(), options)
        })
        .collect()
}

/// Count decrypted mix-net output. Each inner vector is one anonymous
/// ballot's selection codes. Codes that decode to nothing in the election
/// definition are logged and skipped; they can no longer be attributed, so
/// there is nobody to bounce them back to.
pub fn tally_codes(
    election: &Election,
    ballots: &[Vec<u32>],
    now: DateTime<Utc>,
) -> TallyResult {
    let mut totals = empty_totals(election);

    for codes in ballots {
        for &code in codes {
            let selection = match election.selection_from_code(code) {
                Some(selection) => selection,
                None => {
                    warn!("skipping undecodable selection code {}", code);
                    continue;
                }
            };
            if let Some(count) = totals
                .get_mut(&selection.contest_id)
                .and_then(|options| options.get_mut(&selection.option_id))
            {
                *count += 1;
            }
        }
    }

    TallyResult {
        election_id: election.id.clone(),
        ballot_count: ballots.len(),
        totals,
        tallied_at: now,
    }
}

/// Count plaintext selection sets directly. Used when tallying the stored
/// ballots without the mix-net, e.g. in audits against the cascade result.
pub fn tally_selections(
    election: &Election,
    ballots: &[Vec<Selection>],
    now: DateTime<Utc>,
) -> TallyResult {
    let mut totals = empty_totals(election);

    for selections in ballots {
        for selection in selections {
            if let Some(count) = totals
                .get_mut(&selection.contest_id)
                .and_then(|options| options.get_mut(&selection.option_id))
            {
                *count += 1;
            } else {
                warn!(
                    "skipping selection for unknown contest/option {}/{}",
                    selection.contest_id, selection.option_id
                );
            }
        }
    }

    TallyResult {
        election_id: election.id.clone(),
        ballot_count: ballots.len(),
        totals,
        tallied_at: now,
    }
}

impl TallyResult {
    /// Deterministic commitment over the totals, bound into the tally
    /// correctness proof. Excludes `tallied_at` so re-running the same
    /// count commits to the same value.
    pub fn commitment(&self) -> Result<String, Error> {
        #[derive(Serialize)]
        struct Committed<'a> {
            election_id: &'a str,
            ballot_count: usize,
            totals: &'a IndexMap<String, IndexMap<String, u64>>,
        }

        let payload = serde_json::to_string(&Committed {
            election_id: &self.election_id,
            ballot_count: self.ballot_count,
            totals: &self.totals,
        })?;
        Ok(sha256_hex(payload.as_bytes()))
    }

    /// Plurality winners per contest. Ties return every tied option.
    pub fn winners(&self) -> IndexMap<String, Vec<String>> {
        self.totals
            .iter()
            .map(|(contest_id, options)| {
                let top = options.values().max().copied().unwrap_or(0);
                let winners = options
                    .iter()
                    .filter(|(_, &count)| count == top && top > 0)
                    .map(|(option_id, _)| option_id.clone())
                    .collect();
                (contest_id.clone(), winners)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn election(now: DateTime<Utc>) -> Election {
        Election {
            id: "el_1".to_string(),
            name: "Board election".to_string(),
            status: ElectionStatus::Active,
            voting_start_at: now - Duration::hours(1),
            voting_end_at: now + Duration::hours(1),
            allow_vote_change: false,
            vote_change_deadline: None,
            contests: vec![Contest {
                id: "c1".to_string(),
                index: 0,
                name: "Chair".to_string(),
                min_selections: 1,
                max_selections: 1,
                options: vec![
                    ContestOption {
                        id: "o1".to_string(),
                        index: 0,
                        name: "Alice".to_string(),
                    },
                    ContestOption {
                        id: "o2".to_string(),
                        index: 1,
                        name: "Bob".to_string(),
                    },
                ],
            }],
        }
    }

    #[test]
    fn test_tally_codes() {
        let now = Utc::now();
        let election = election(now);

        // codes: o1 = 0, o2 = 1; 9999 decodes to nothing
        let tally = tally_codes(&election, &[vec![0], vec![1], vec![0], vec![9999]], now);

        assert_eq!(tally.ballot_count, 4);
        assert_eq!(tally.totals["c1"]["o1"], 2);
        assert_eq!(tally.totals["c1"]["o2"], 1);
        assert_eq!(tally.winners()["c1"], vec!["o1".to_string()]);
    }

    #[test]
    fn test_commitment_is_deterministic_and_time_independent() {
        let now = Utc::now();
        let election = election(now);

        let a = tally_codes(&election, &[vec![0], vec![1]], now);
        let b = tally_codes(&election, &[vec![0], vec![1]], now + Duration::hours(1));
        assert_eq!(a.commitment().unwrap(), b.commitment().unwrap());

        let c = tally_codes(&election, &[vec![0], vec![0]], now);
        assert_ne!(a.commitment().unwrap(), c.commitment().unwrap());
    }

    #[test]
    fn test_tie_reports_all_winners() {
        let now = Utc::now();
        let election = election(now);

        let tally = tally_selections(
            &election,
            &[
                vec![Selection::plain("c1", "o1")],
                vec![Selection::plain("c1", "o2")],
            ],
            now,
        );
        assert_eq!(tally.winners()["c1"].len(), 2);
    }
}
