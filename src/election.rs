use crate::*;
use chrono::{DateTime, Utc};

/// Contests are addressed by a small index so selections can be packed into
/// the bounded plaintext space of the exponential-ElGamal mix-net encoding.
pub const MAX_CONTESTS: u16 = 256;
pub const MAX_OPTIONS_PER_CONTEST: u16 = 256;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ElectionStatus {
    Draft,
    Published,
    Active,
    Paused,
    Closed,
    Archived,
}

impl std::fmt::Display for ElectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            ElectionStatus::Draft => "draft",
            ElectionStatus::Published => "published",
            ElectionStatus::Active => "active",
            ElectionStatus::Paused => "paused",
            ElectionStatus::Closed => "closed",
            ElectionStatus::Archived => "archived",
        };
        write!(f, "{}", name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ContestOption {
    pub id: String,
    pub index: u16,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Contest {
    pub id: String,
    pub index: u16,
    pub name: String,

    /// Selection cardinality rules
    pub min_selections: u32,
    pub max_selections: u32,

    pub options: Vec<ContestOption>,
}

impl Contest {
    pub fn get_option(&self, option_id: &str) -> Option<&ContestOption> {
        self.options.iter().find(|o| o.id == option_id)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Election {
    pub id: String,
    pub name: String,
    pub status: ElectionStatus,

    pub voting_start_at: DateTime<Utc>,
    pub voting_end_at: DateTime<Utc>,

    pub allow_vote_change: bool,
    pub vote_change_deadline: Option<DateTime<Utc>>,

    pub contests: Vec<Contest>,
}

/// A single vote selection within a contest.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub contest_id: String,
    pub option_id: String,

    /// For ranked-choice contests
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,

    /// For score-voting contests
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
}

impl Selection {
    pub fn plain(contest_id: &str, option_id: &str) -> Self {
        Selection {
            contest_id: contest_id.to_string(),
            option_id: option_id.to_string(),
            rank: None,
            score: None,
        }
    }
}

impl Election {
    pub fn get_contest(&self, contest_id: &str) -> Option<&Contest> {
        self.contests.iter().find(|c| c.id == contest_id)
    }

    fn contest_by_index(&self, index: u16) -> Option<&Contest> {
        self.contests.iter().find(|c| c.index == index)
    }

    /// The election must be ACTIVE and inside its voting window.
    pub fn assert_voting_open(&self, now: DateTime<Utc>) -> Result<(), Error> {
        if self.status != ElectionStatus::Active {
            return Err(ValidationError::ElectionNotActive(
                self.id.clone(),
                self.status.to_string(),
            )
            .into());
        }
        if now < self.voting_start_at {
            return Err(ValidationError::VotingNotStarted.into());
        }
        if now > self.voting_end_at {
            return Err(ValidationError::VotingEnded.into());
        }
        Ok(())
    }

    /// Validate that every selection references an existing contest/option
    /// and that per-contest cardinality matches the contest rules.
    pub fn validate_selections(&self, selections: &[Selection]) -> Result<(), Error> {
        if selections.is_empty() {
            return Err(ValidationError::EmptySelections.into());
        }

        for selection in selections {
            let contest = self
                .get_contest(&selection.contest_id)
                .ok_or_else(|| ValidationError::UnknownContest(selection.contest_id.clone()))?;

            if contest.get_option(&selection.option_id).is_none() {
                return Err(ValidationError::UnknownOption {
                    contest: selection.contest_id.clone(),
                    option: selection.option_id.clone(),
                }
                .into());
            }
        }

        for contest in &self.contests {
            let count = selections
                .iter()
                .filter(|s| s.contest_id == contest.id)
                .count() as u32;
            if count > 0 && (count < contest.min_selections || count > contest.max_selections) {
                return Err(ValidationError::SelectionCardinality {
                    contest: contest.id.clone(),
                    min: contest.min_selections,
                    max: contest.max_selections,
                    got: count,
                }
                .into());
            }
        }

        Ok(())
    }

    /// Pack a selection into the bounded mix-net plaintext space:
    /// `contest_index * MAX_OPTIONS_PER_CONTEST + option_index`.
    pub fn selection_code(&self, selection: &Selection) -> Result<u32, Error> {
        let contest = self
            .get_contest(&selection.contest_id)
            .ok_or_else(|| ValidationError::UnknownContest(selection.contest_id.clone()))?;
        let option = contest
            .get_option(&selection.option_id)
            .ok_or_else(|| ValidationError::UnknownOption {
                contest: selection.contest_id.clone(),
                option: selection.option_id.clone(),
            })?;

        if contest.index >= MAX_CONTESTS || option.index >= MAX_OPTIONS_PER_CONTEST {
            return Err(
                ValidationError::SelectionNotEncodable(contest.index, option.index).into(),
            );
        }

        Ok(contest.index as u32 * MAX_OPTIONS_PER_CONTEST as u32 + option.index as u32)
    }

    /// Invert `selection_code`.
    pub fn selection_from_code(&self, code: u32) -> Option<Selection> {
        let contest_index = (code / MAX_OPTIONS_PER_CONTEST as u32) as u16;
        let option_index = (code % MAX_OPTIONS_PER_CONTEST as u32) as u16;

        let contest = self.contest_by_index(contest_index)?;
        let option = contest.options.iter().find(|o| o.index == option_index)?;

        Some(Selection::plain(&contest.id, &option.id))
    }
}
