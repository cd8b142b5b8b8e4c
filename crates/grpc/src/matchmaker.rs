//! Matchmaking decision logic seam.
//!
//! The server only orchestrates calls; the decision function behind
//! [`Matchmaker`] is an external collaborator. [`PairMatchmaker`] is the
//! built-in placeholder so the binary runs end to end.

use matchfn_proto::{Match, Rules, Ticket};

/// Matchmaking decision function invoked through the service contract.
///
/// Implementations must be cheap to call per ticket: `make_matches` runs
/// inline on the request stream.
pub trait Matchmaker: Send + Sync {
    /// Stat codes the given ruleset requires the orchestrator to provide.
    fn stat_codes(&self, rules: &Rules) -> Vec<String>;

    /// Whether a ticket is admissible for the given ruleset.
    fn validate_ticket(&self, ticket: &Ticket, rules: &Rules) -> bool;

    /// Drains whatever complete matches can be formed from `pool`.
    ///
    /// Consumed tickets must be removed from the pool; leftovers stay for
    /// the next call.
    fn make_matches(&self, pool: &mut Vec<Ticket>, rules: &Rules) -> Vec<Match>;
}

/// Trivial matchmaker pairing tickets two at a time, in arrival order.
#[derive(Debug, Default, Clone)]
pub struct PairMatchmaker;

impl Matchmaker for PairMatchmaker {
    fn stat_codes(&self, _rules: &Rules) -> Vec<String> {
        Vec::new()
    }

    fn validate_ticket(&self, ticket: &Ticket, _rules: &Rules) -> bool {
        !ticket.players.is_empty()
    }

    fn make_matches(&self, pool: &mut Vec<Ticket>, _rules: &Rules) -> Vec<Match> {
        let mut matches = Vec::new();
        while pool.len() >= 2 {
            let tickets: Vec<Ticket> = pool.drain(..2).collect();
            matches.push(Match {
                tickets,
                region_preferences: Vec::new(),
                match_attributes: Default::default(),
            });
        }
        matches
    }
}
