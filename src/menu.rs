//! Interactive operator menu.
//!
//! The menu only understands a fixed set of commands; anything else is
//! reported and the menu is shown again.

use crate::benchmark::ExperimentKind;
use crate::config::SweepSettings;
use crate::coordination::OperatorInput;
use anyhow::Result;
use colored::*;
use std::io::Write;
use std::str::FromStr;

/// Commands accepted at the menu prompt.
///
/// Each command has a number (as printed in the menu) and a name, so both
/// `2` and `msg-sweep` select the message-size sweep. Input is matched
/// case-insensitively after trimming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    /// Run a single experiment
    Run(ExperimentKind),
    /// Run every experiment in [`ExperimentKind::ALL`] order
    RunAll,
    /// Render charts from the existing result file
    Plot,
    Quit,
}

impl FromStr for MenuChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "baseline" => Ok(MenuChoice::Run(ExperimentKind::Baseline)),
            "2" | "msg-sweep" => Ok(MenuChoice::Run(ExperimentKind::MsgSweep)),
            "3" | "window-sweep" => Ok(MenuChoice::Run(ExperimentKind::WindowSweep)),
            "4" | "all" => Ok(MenuChoice::RunAll),
            "5" | "plot" => Ok(MenuChoice::Plot),
            "q" | "quit" | "exit" => Ok(MenuChoice::Quit),
            other => Err(format!("Invalid input '{}', please try again.", other)),
        }
    }
}

/// Interactive front end used when no subcommand is given.
///
/// The menu reads from the same [`OperatorInput`] as the server prompt, so
/// answers piped on stdin are consumed in the order they are asked for:
///
/// ```text
/// 1          <- menu: baseline
///            <- prompt: server for write is up
///            <- prompt: server for send is up
/// q          <- menu: quit
/// ```
pub struct Menu {
    input: OperatorInput,
}

impl Menu {
    pub fn new(input: OperatorInput) -> Self {
        Self { input }
    }

    /// Print what the harness assumes about the two hosts
    pub fn print_banner(settings: &SweepSettings) {
        println!("{}", "This harness assumes:".bold());
        println!("  Client can run: {}", settings.client_bin.display());
        println!("  Server can run: {}", settings.server_bin.display());
        println!("  Server address = {}, port = {}", settings.server, settings.port);
        println!("  Results file   = {}", settings.output.display());
        println!("\nSuggested order: baseline, then sweeps, then plot.");
    }

    fn print_options(settings: &SweepSettings) {
        println!("\n{}", "Select an option:".bold());
        println!("  1) {}", ExperimentKind::Baseline.describe(settings));
        println!("  2) {}", ExperimentKind::MsgSweep.describe(settings));
        println!("  3) {}", ExperimentKind::WindowSweep.describe(settings));
        println!("  4) Run all experiments");
        println!("  5) Plot using existing CSV");
        println!("  q) Quit");
    }

    /// Show the options until a valid command arrives.
    ///
    /// End of input counts as `Quit`.
    pub async fn next_choice(&self, settings: &SweepSettings) -> Result<MenuChoice> {
        loop {
            Self::print_options(settings);
            print!("> ");
            std::io::stdout().flush()?;
            let line = match self.input.read_line().await? {
                Some(line) => line,
                None => return Ok(MenuChoice::Quit),
            };
            match line.parse::<MenuChoice>() {
                Ok(choice) => return Ok(choice),
                Err(msg) => println!("{}", msg.yellow()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_menu_choices() {
        assert_eq!(
            "1".parse::<MenuChoice>(),
            Ok(MenuChoice::Run(ExperimentKind::Baseline))
        );
        assert_eq!(
            " Window-Sweep ".parse::<MenuChoice>(),
            Ok(MenuChoice::Run(ExperimentKind::WindowSweep))
        );
        assert_eq!("4".parse::<MenuChoice>(), Ok(MenuChoice::RunAll));
        assert_eq!("plot".parse::<MenuChoice>(), Ok(MenuChoice::Plot));
        assert_eq!("Q".parse::<MenuChoice>(), Ok(MenuChoice::Quit));
        assert!("7".parse::<MenuChoice>().is_err());
        assert!("".parse::<MenuChoice>().is_err());
    }

    #[tokio::test]
    async fn test_next_choice_skips_invalid_lines() {
        let menu = Menu::new(OperatorInput::new(&b"nope\n\n2\n"[..]));
        let settings = SweepSettings::default();
        assert_eq!(
            menu.next_choice(&settings).await.unwrap(),
            MenuChoice::Run(ExperimentKind::MsgSweep)
        );
        assert_eq!(menu.next_choice(&settings).await.unwrap(), MenuChoice::Quit);
    }
}
