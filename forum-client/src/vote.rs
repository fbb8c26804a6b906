use std::sync::atomic::{AtomicBool, Ordering};

use crate::{
    api::{Auth, Error, Store, SubjectId, UserId, Vote, VoteDirection},
    retry::{retrying, Budget},
    ClientConfig, KeyedMutex,
};

/// Effect of one vote action on the (subject, voter) pair
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Transition {
    /// There was no vote, now there is one
    Insert(VoteDirection),

    /// The vote changed direction
    Flip {
        from: VoteDirection,
        to: VoteDirection,
    },

    /// The same vote was cast again, which removes it
    Retract(VoteDirection),
}

impl Transition {
    pub fn decide(existing: Option<VoteDirection>, requested: VoteDirection) -> Transition {
        match existing {
            None => Transition::Insert(requested),
            Some(d) if d == requested => Transition::Retract(d),
            Some(from) => Transition::Flip {
                from,
                to: requested,
            },
        }
    }

    pub fn score_delta(&self) -> i64 {
        match *self {
            Transition::Insert(d) => d.weight(),
            Transition::Flip { from, to } => to.weight() - from.weight(),
            Transition::Retract(d) => -d.weight(),
        }
    }

    /// Optimistic score, only fit for displaying until the authoritative one comes back
    pub fn preview(&self, old_score: i64) -> i64 {
        old_score + self.score_delta()
    }

    pub fn previous_vote(&self) -> Option<VoteDirection> {
        match *self {
            Transition::Insert(_) => None,
            Transition::Flip { from, .. } => Some(from),
            Transition::Retract(d) => Some(d),
        }
    }

    pub fn resulting_vote(&self) -> Option<VoteDirection> {
        match *self {
            Transition::Insert(d) => Some(d),
            Transition::Flip { to, .. } => Some(to),
            Transition::Retract(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VoteOutcome {
    pub subject: SubjectId,
    pub transition: Transition,

    /// Cached score as read before the write
    pub previous_score: i64,

    /// Score recomputed from the vote tally after the write, or the preview if
    /// that failed
    pub new_score: i64,

    /// False if the vote was recorded but the score could not be recomputed.
    /// The cached score of the subject is then stale until its next vote.
    pub score_confirmed: bool,
}

/// Applies vote actions, keeping at most one vote per (subject, voter)
pub struct VoteLedger<S, A> {
    store: S,
    auth: A,
    config: ClientConfig,
    locks: KeyedMutex<(UserId, SubjectId)>,
}

impl<S: Store, A: Auth> VoteLedger<S, A> {
    pub fn new(store: S, auth: A, config: ClientConfig) -> VoteLedger<S, A> {
        VoteLedger {
            store,
            auth,
            config,
            locks: KeyedMutex::new(),
        }
    }

    /// The signed-in user, who is the only one allowed to vote through this ledger
    pub fn voter(&self) -> Result<UserId, Error> {
        self.auth
            .current_user()
            .map(|u| u.id)
            .ok_or(Error::Unauthenticated)
    }

    /// Resolves `direction` against the voter's existing vote and persists the result.
    ///
    /// Calls for the same (voter, subject) pair are serialized, so a double-click
    /// results in an insert then a retract, never in two votes. `StoreUnavailable`
    /// is retried `config.unavailable_retries` times at each step, and
    /// `ConflictingWrite` restarts the whole read-decide-write sequence
    /// `config.conflict_retries` times.
    pub async fn apply_vote(
        &self,
        voter: UserId,
        subject: SubjectId,
        direction: VoteDirection,
    ) -> Result<VoteOutcome, Error> {
        if self.voter()? != voter {
            return Err(Error::Unauthenticated);
        }
        self.locks
            .run(
                (voter, subject),
                retrying("applying vote", Budget::conflicts(&self.config), || {
                    self.attempt(voter, subject, direction)
                }),
            )
            .await
    }

    /// Existing vote of the signed-in user on `subject`
    pub async fn current_vote(&self, subject: SubjectId) -> Result<Option<VoteDirection>, Error> {
        let voter = self.voter()?;
        let store = &self.store;
        retrying(
            "reading vote",
            Budget::unavailable(&self.config),
            || async move { Ok::<_, Error>(store.fetch_vote(subject, voter).await?) },
        )
        .await
    }

    async fn attempt(
        &self,
        voter: UserId,
        subject: SubjectId,
        direction: VoteDirection,
    ) -> Result<VoteOutcome, Error> {
        let budget = Budget::unavailable(&self.config);
        let store = &self.store;

        let (previous_score, existing) = retrying("reading vote", budget, || async move {
            let score = store
                .fetch_subject_score(subject)
                .await?
                .ok_or(Error::SubjectNotFound(subject))?;
            let existing = store.fetch_vote(subject, voter).await?;
            Ok::<_, Error>((score, existing))
        })
        .await?;

        let transition = Transition::decide(existing, direction);
        let target = transition.resulting_vote();
        tracing::debug!(?subject, ?voter, ?transition, "applying vote");

        let first = &AtomicBool::new(true);
        retrying("writing vote", budget, || async move {
            let from = if first.swap(false, Ordering::Relaxed) {
                existing
            } else {
                // The previous attempt may have been applied with only its response lost
                store.fetch_vote(subject, voter).await?
            };
            write_towards(store, voter, subject, from, target).await
        })
        .await?;

        // The vote is recorded from here on, failing now would get the action repeated
        let recount = retrying("recomputing score", budget, || async move {
            let score = store.tally_votes(subject).await?.score();
            store.set_vote_score(subject, score).await?;
            Ok::<_, Error>(score)
        })
        .await;
        let (new_score, score_confirmed) = match recount {
            Ok(score) => (score, true),
            Err(err) => {
                tracing::warn!(?subject, ?err, "vote recorded but its score was not recomputed");
                (transition.preview(previous_score), false)
            }
        };

        Ok(VoteOutcome {
            subject,
            transition,
            previous_score,
            new_score,
            score_confirmed,
        })
    }
}

/// Issues the single conditional write turning `from` into `to`, if any is needed
async fn write_towards<S: Store>(
    store: &S,
    voter: UserId,
    subject: SubjectId,
    from: Option<VoteDirection>,
    to: Option<VoteDirection>,
) -> Result<(), Error> {
    let vote = |direction| Vote {
        subject,
        voter,
        direction,
    };
    match (from, to) {
        (None, Some(d)) => store.insert_vote(vote(d)).await?,
        (Some(f), None) => store.delete_vote(subject, voter, f).await?,
        (Some(f), Some(t)) if f != t => store.update_vote(vote(t), f).await?,
        _ => (),
    }
    Ok(())
}
