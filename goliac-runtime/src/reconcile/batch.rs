//! The batch executor: accumulate, guard, dispatch.
use std::future::Future;

use goliac_client::PassContext;

use super::Command;
use crate::{errors::ErrorCollection, Error, Result};

/// Something that can apply one command for real (or pretend to).
pub trait CommandExecutor {
    /// Apply one command. Failures go to the error sink; the batch
    /// keeps dispatching the remaining commands either way.
    fn apply(
        &mut self,
        ctx: &PassContext,
        command: &Command,
        errors: &mut ErrorCollection,
    ) -> impl Future<Output = ()> + Send;
}

/// Ordered accumulation of commands for one pass, with the
/// `max_changesets` guardrail enforced at commit time.
#[derive(Debug)]
pub struct CommandBatch {
    commands: Vec<Command>,
    max_changesets: usize,
    override_cap: bool,
}

impl CommandBatch {
    /// An empty batch with the given cap; `override_cap` disables the
    /// guardrail for one deliberate oversized apply.
    pub fn new(max_changesets: usize, override_cap: bool) -> Self {
        CommandBatch {
            commands: Vec::new(),
            max_changesets,
            override_cap,
        }
    }

    /// Drop anything accumulated and start over.
    pub fn begin(&mut self) {
        self.commands.clear();
    }

    /// Append one command.
    pub fn add(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// The accumulated commands, in insertion order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of accumulated commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Discard the batch, e.g. when the pass failed after diffing.
    pub fn rollback(&mut self, reason: &str) {
        if !self.commands.is_empty() {
            tracing::warn!(dropped = self.commands.len(), reason, "rolling back command batch");
        }
        self.commands.clear();
    }

    /// Dispatch every command in insertion order.
    ///
    /// Fails up front — touching nothing — when the batch exceeds
    /// `max_changesets` and the override is unset.
    pub async fn commit<E: CommandExecutor>(
        &mut self,
        ctx: &PassContext,
        executor: &mut E,
        errors: &mut ErrorCollection,
    ) -> Result<()> {
        if self.commands.len() > self.max_changesets && !self.override_cap {
            let count = self.commands.len();
            self.commands.clear();
            return Err(Error::TooManyChangesets {
                count,
                max: self.max_changesets,
            });
        }
        for command in std::mem::take(&mut self.commands) {
            tracing::debug!(%command, "applying");
            executor.apply(ctx, &command, errors).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records applied commands without side effects.
    #[derive(Default)]
    pub(crate) struct RecordingExecutor {
        pub applied: Vec<Command>,
    }

    impl CommandExecutor for RecordingExecutor {
        async fn apply(
            &mut self,
            _ctx: &PassContext,
            command: &Command,
            _errors: &mut ErrorCollection,
        ) {
            self.applied.push(command.clone());
        }
    }

    fn user_command(login: &str) -> Command {
        Command::AddUserToOrg { login: login.into() }
    }

    #[tokio::test]
    async fn commits_in_insertion_order() {
        let ctx = PassContext::new();
        let mut errors = ErrorCollection::new();
        let mut executor = RecordingExecutor::default();
        let mut batch = CommandBatch::new(10, false);

        batch.add(user_command("b"));
        batch.add(user_command("a"));
        batch.commit(&ctx, &mut executor, &mut errors).await.unwrap();

        assert_eq!(executor.applied, vec![user_command("b"), user_command("a")]);
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn guardrail_refuses_without_side_effects() {
        let ctx = PassContext::new();
        let mut errors = ErrorCollection::new();
        let mut executor = RecordingExecutor::default();
        let mut batch = CommandBatch::new(2, false);

        for login in ["a", "b", "c"] {
            batch.add(user_command(login));
        }
        let err = batch.commit(&ctx, &mut executor, &mut errors).await.unwrap_err();

        assert!(matches!(err, Error::TooManyChangesets { count: 3, max: 2 }));
        assert!(executor.applied.is_empty());
    }

    #[tokio::test]
    async fn override_lifts_the_cap() {
        let ctx = PassContext::new();
        let mut errors = ErrorCollection::new();
        let mut executor = RecordingExecutor::default();
        let mut batch = CommandBatch::new(1, true);

        for login in ["a", "b", "c"] {
            batch.add(user_command(login));
        }
        batch.commit(&ctx, &mut executor, &mut errors).await.unwrap();
        assert_eq!(executor.applied.len(), 3);
    }

    #[tokio::test]
    async fn rollback_discards() {
        let mut batch = CommandBatch::new(10, false);
        batch.add(user_command("a"));
        batch.rollback("pass failed");
        assert!(batch.is_empty());
    }
}
