//! Remote-selection strategies: uniform random, or the live queue-depth
//! probe that favors the least-loaded worker.

use std::thread;

use crossbeam_channel::unbounded;
use rand::Rng;

use crate::errors::*;

use super::{remote_status, Power, Remote};

pub trait RemoteSelector {
    fn remote(&self) -> Result<Remote>;
    fn remote_with_preprocessor(&self) -> Result<Remote>;
}

pub struct RandomSelector {
    remotes: Vec<Remote>,
    preprocessor_remotes: Vec<Remote>,
}

impl RandomSelector {
    pub fn new(remotes: Vec<Remote>) -> RandomSelector {
        let preprocessor_remotes = remotes
            .iter()
            .filter(|remote| remote.has_power(Power::Preprocess))
            .cloned()
            .collect();
        RandomSelector {
            remotes,
            preprocessor_remotes,
        }
    }

    fn pick(remotes: &[Remote]) -> Result<Remote> {
        if remotes.is_empty() {
            bail!(ErrorKind::NoRemotesAvailable);
        }
        Ok(remotes[rand::thread_rng().gen_range(0..remotes.len())].clone())
    }
}

impl RemoteSelector for RandomSelector {
    fn remote(&self) -> Result<Remote> {
        Self::pick(&self.remotes)
    }

    fn remote_with_preprocessor(&self) -> Result<Remote> {
        Self::pick(&self.preprocessor_remotes)
    }
}

pub struct StatusSelector {
    remotes: Vec<Remote>,
}

impl StatusSelector {
    pub fn new(remotes: Vec<Remote>) -> StatusSelector {
        StatusSelector { remotes }
    }

    /// Probe every candidate in parallel; a failed probe scores -1 and drops
    /// out of contention without failing the selection.
    fn select(&self, remotes: &[Remote]) -> Result<Remote> {
        if remotes.is_empty() {
            bail!(ErrorKind::NoRemotesAvailable);
        }
        let (score_tx, score_rx) = unbounded();
        for remote in remotes {
            let remote = remote.clone();
            let score_tx = score_tx.clone();
            thread::spawn(move || {
                let score = match remote_status(&remote) {
                    Ok(status) => status.queued.len() as i64,
                    Err(err) => {
                        debug!(
                            "status probe failed: {}: {}",
                            remote.address,
                            error_string(&err)
                        );
                        -1
                    }
                };
                let _ = score_tx.send((remote, score));
            });
        }
        drop(score_tx);
        best_remote(score_rx.iter().collect())
    }
}

impl RemoteSelector for StatusSelector {
    fn remote(&self) -> Result<Remote> {
        self.select(&self.remotes)
    }

    fn remote_with_preprocessor(&self) -> Result<Remote> {
        let capable: Vec<Remote> = self
            .remotes
            .iter()
            .filter(|remote| remote.has_power(Power::Preprocess))
            .cloned()
            .collect();
        self.select(&capable)
    }
}

/// Lowest non-negative score wins; negative scores mark failed probes.
fn best_remote(scores: Vec<(Remote, i64)>) -> Result<Remote> {
    let mut best: Option<(Remote, i64)> = None;
    for (remote, score) in scores {
        if score < 0 {
            continue;
        }
        let better = match best {
            Some((_, best_score)) => score < best_score,
            None => true,
        };
        if better {
            best = Some((remote, score));
        }
    }
    match best {
        Some((remote, score)) => {
            debug!("selected {} with queue depth {}", remote.address, score);
            Ok(remote)
        }
        None => Err(ErrorKind::NoRemotesAvailable.into()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn remote(address: &str, powers: Vec<Power>) -> Remote {
        Remote {
            address: address.to_string(),
            public_key: None,
            powers,
        }
    }

    #[test]
    fn test_best_remote_lowest_nonnegative() {
        let chosen = best_remote(vec![
            (remote("a:1", vec![Power::Compile]), 2),
            (remote("b:1", vec![Power::Compile]), 0),
            (remote("c:1", vec![Power::Compile]), 5),
        ])
        .unwrap();
        assert_eq!(chosen.address, "b:1");
    }

    #[test]
    fn test_best_remote_skips_failed_probes() {
        let chosen = best_remote(vec![
            (remote("a:1", vec![Power::Compile]), 2),
            (remote("b:1", vec![Power::Compile]), -1),
        ])
        .unwrap();
        assert_eq!(chosen.address, "a:1");
    }

    #[test]
    fn test_best_remote_all_failed() {
        let result = best_remote(vec![
            (remote("a:1", vec![Power::Compile]), -1),
            (remote("b:1", vec![Power::Compile]), -1),
        ]);
        match result {
            Err(Error(ErrorKind::NoRemotesAvailable, _)) => (),
            other => panic!("expected no remotes, got {:?}", other.map(|r| r.address)),
        }
    }

    #[test]
    fn test_random_selector_powers() {
        let selector = RandomSelector::new(vec![
            remote("a:1", vec![Power::Compile]),
            remote("b:1", vec![Power::Compile, Power::Preprocess]),
        ]);
        for _ in 0..10 {
            assert_eq!(
                selector.remote_with_preprocessor().unwrap().address,
                "b:1"
            );
        }
        assert!(selector.remote().is_ok());
    }

    #[test]
    fn test_random_selector_empty() {
        let selector = RandomSelector::new(vec![]);
        match selector.remote() {
            Err(Error(ErrorKind::NoRemotesAvailable, _)) => (),
            other => panic!("expected no remotes, got {:?}", other.map(|r| r.address)),
        }
    }
}
