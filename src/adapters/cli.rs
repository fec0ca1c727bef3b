//! CLI adapter - interactive and single-message command line interface.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use crate::agent::{EventRouter, IncomingMessage, Reply};
use crate::Result;

/// CLI channel talking to the router as a single local user.
pub struct CliChannel {
    router: Arc<EventRouter>,
    user_id: String,
}

impl CliChannel {
    pub fn new(router: Arc<EventRouter>, user_id: &str) -> Self {
        Self {
            router,
            user_id: user_id.to_string(),
        }
    }

    /// Run a single message and return the reply.
    pub async fn run_once(&self, message: &str) -> Result<Reply> {
        let event = IncomingMessage::new("cli", "cli", &self.user_id, message);
        self.router.handle(event).await
    }

    /// Run interactive REPL loop.
    pub async fn run_interactive(&self) -> Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("\n> ");
            stdout.flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                break;
            }

            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            if matches!(input.to_lowercase().as_str(), "exit" | "quit" | "q") {
                println!("Goodbye!");
                break;
            }

            match self.run_once(input).await {
                Ok(reply) => println!("\n{}", render(&reply)),
                Err(e) => eprintln!("\nError: {e}"),
            }
        }

        Ok(())
    }

    /// Turns stored for this user.
    pub async fn history_len(&self) -> usize {
        self.router.sessions().turn_count(&self.user_id).await
    }
}

/// Reply text followed by any auth link
pub fn render(reply: &Reply) -> String {
    let mut out = reply.reply.clone();
    if let Some(url) = &reply.login_url {
        out.push_str(&format!("\n\nSign in: {url}"));
    }
    if let Some(url) = &reply.logout_url {
        out.push_str(&format!("\n\nSign out: {url}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::fake::FakeLlmClient;
    use crate::agent::ToolLoop;
    use crate::auth::testing::fake_flow;
    use crate::tools::ToolRegistry;

    #[tokio::test]
    async fn test_run_once_keeps_history() {
        let (flow, _, _) = fake_flow();
        let client = Arc::new(FakeLlmClient::new(vec!["Hello!", "Still here."]));
        let tool_loop = ToolLoop::new(client, Arc::new(ToolRegistry::new()), 4);
        let cli = CliChannel::new(Arc::new(EventRouter::new(tool_loop, flow, 20)), "local");

        assert_eq!(cli.run_once("hi").await.unwrap().reply, "Hello!");
        assert_eq!(cli.run_once("still there?").await.unwrap().reply, "Still here.");
        assert_eq!(cli.history_len().await, 4);
    }

    #[test]
    fn test_render_links() {
        let reply = Reply {
            login_url: Some("https://courier.example.com/auth/google/login?user_id=local".to_string()),
            ..Reply::text("Please sign in.")
        };
        assert_eq!(
            render(&reply),
            "Please sign in.\n\nSign in: https://courier.example.com/auth/google/login?user_id=local"
        );
        assert_eq!(render(&Reply::text("hi")), "hi");
    }
}
