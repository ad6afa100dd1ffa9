//! Commands the host application can run.
//!
//! Each command implements the [`Command`] trait and is looked up by name in
//! a [`CommandRegistry`] when the user types `/name` in the host.

pub mod artifact;
pub mod opener;
pub mod sketch;

use async_trait::async_trait;

use pi_sketch_core::host::{Host, NoticeLevel};

pub use sketch::{SketchCommand, SketchReport};

/// A slash command exposed to the host.
#[async_trait]
pub trait Command: Send + Sync {
    /// Name without the leading slash (e.g., "sketch").
    fn name(&self) -> &str;

    /// One-line description shown in command listings.
    fn description(&self) -> &str;

    /// Run the command. Results reach the user through `host`.
    async fn execute(&self, args: &str, host: &dyn Host) -> anyhow::Result<()>;
}

/// Registry of available commands.
#[derive(Default)]
pub struct CommandRegistry {
    commands: Vec<Box<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, command: Box<dyn Command>) {
        self.commands.push(command);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Command> {
        self.commands
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }

    pub fn list(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name()).collect()
    }

    /// Parse a `/name args` line and run the matching command.
    pub async fn dispatch(&self, line: &str, host: &dyn Host) -> anyhow::Result<()> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            anyhow::bail!("not a command: {line:?}");
        };
        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };

        match self.get(name) {
            Some(command) => command.execute(args, host).await,
            None => {
                host.notify(&format!("Unknown command: /{name}"), NoticeLevel::Error);
                anyhow::bail!("unknown command: /{name}")
            }
        }
    }
}

/// Register every built-in command.
pub fn register_builtin_commands(registry: &mut CommandRegistry, sketch: SketchCommand) {
    registry.register(Box::new(sketch));
}
