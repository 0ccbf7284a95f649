//! Pushes compiled rules to the controller and takes them down again.

use rayon::prelude::*;

use crate::controller::{Controller, ControllerError};
use crate::flow::FlowRule;
use crate::network::types::SwitchId;

/// How rules are pushed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum InstallMode {
    /// One push at a time, stopping at the first failure.
    #[default]
    Sequential,
    /// All pushes issued concurrently. Every push completes before the result is known.
    Parallel,
}

/// Installs and deletes rules, one remote call per rule.
#[derive(Debug, derive_new::new)]
pub struct Installer<C> {
    controller: C,
    mode: InstallMode,
}

impl<C: Controller + Sync> Installer<C> {
    /// Installs `rules` and returns their names in rule order.
    ///
    /// Installation is all-or-nothing: if any push fails, every rule that was acknowledged is
    /// deleted again (most recent first) before the error is returned. Rules whose push timed out
    /// or broke off may have landed anyway, so they are deleted too.
    pub fn install(&self, rules: &[FlowRule]) -> Result<Vec<String>, InstallError> {
        log::debug!("pushing {} rules ({:?})", rules.len(), self.mode);
        match self.mode {
            InstallMode::Sequential => self.install_sequential(rules),
            InstallMode::Parallel => self.install_parallel(rules),
        }
    }

    fn install_sequential(&self, rules: &[FlowRule]) -> Result<Vec<String>, InstallError> {
        let mut installed = Vec::with_capacity(rules.len());
        for rule in rules {
            match self.controller.push_flow(rule) {
                Ok(()) => installed.push(rule.name.clone()),
                Err(e) => {
                    let unknown = if e.is_indeterminate() {
                        vec![rule.name.clone()]
                    } else {
                        Vec::new()
                    };
                    return Err(self.compensate(rule, e, installed, unknown));
                }
            }
        }
        Ok(installed)
    }

    fn install_parallel(&self, rules: &[FlowRule]) -> Result<Vec<String>, InstallError> {
        let (s, r) = crossbeam_channel::unbounded();
        rules
            .par_iter()
            .enumerate()
            .for_each_with(s, |s, (i, rule)| {
                let res = self.controller.push_flow(rule);
                s.send((i, res)).unwrap(); // channel will not become disconnected
            });
        let mut results = r.into_iter().collect::<Vec<_>>();
        results.sort_unstable_by_key(|&(i, _)| i);
        let mut installed = Vec::with_capacity(rules.len());
        let mut unknown = Vec::new();
        let mut failure = None;
        for (i, res) in results {
            match res {
                Ok(()) => installed.push(rules[i].name.clone()),
                Err(e) => {
                    if e.is_indeterminate() {
                        unknown.push(rules[i].name.clone());
                    }
                    if failure.is_none() {
                        failure = Some((i, e));
                    }
                }
            }
        }
        match failure {
            None => Ok(installed),
            Some((i, e)) => Err(self.compensate(&rules[i], e, installed, unknown)),
        }
    }

    fn compensate(
        &self,
        failed: &FlowRule,
        source: ControllerError,
        installed: Vec<String>,
        unknown: Vec<String>,
    ) -> InstallError {
        log::warn!(
            "push of {} to {} failed ({source}), removing {} installed and {} unconfirmed rules",
            failed.name,
            failed.switch,
            installed.len(),
            unknown.len()
        );
        let report = self.delete(unknown.iter().rev().chain(installed.iter().rev()));
        for (name, e) in &report.failed {
            log::error!("rule {name} could not be removed and is left on the controller: {e}");
        }
        InstallError {
            rule: failed.name.clone(),
            switch: failed.switch.clone(),
            source,
            compensated: report.deleted,
            leaked: report.failed.into_iter().map(|(name, _)| name).collect(),
        }
    }

    /// Deletes rules by name, in the given order. Every name is attempted even if some fail.
    /// Names the controller does not know count as deleted.
    pub fn delete<I, S>(&self, names: I) -> DeleteReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = DeleteReport::default();
        for name in names {
            let name = name.as_ref();
            match self.controller.delete_flow(name) {
                Ok(()) => report.deleted.push(name.to_owned()),
                Err(e) => report.failed.push((name.to_owned(), e)),
            }
        }
        report
    }
}

/// The outcome of a batch of deletes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, ControllerError)>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A rule push failed. Rules acknowledged before the failure, and rules whose push outcome is
/// unknown, have been deleted again, except the ones listed in `leaked`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to install {rule} on switch {switch}: {source}")]
pub struct InstallError {
    pub rule: String,
    pub switch: SwitchId,
    pub source: ControllerError,
    pub compensated: Vec<String>,
    pub leaked: Vec<String>,
}
