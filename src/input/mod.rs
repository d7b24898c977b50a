use crate::app::actions::Action;
use crate::app::events::Event;
use crate::source::Category;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

pub const HELP: &str = "commands: cat <sub|dub|raw> | server <name> | source <n> | retry | status | quit";

/// Forward stdin lines to the event loop until stdin closes or the loop is gone.
pub fn spawn_input_task(tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(Event::Input(line)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = tx.send(Event::Input("quit".into())).await;
                    break;
                }
                Err(e) => {
                    tracing::warn!("read stdin: {e}");
                    break;
                }
            }
        }
    });
}

/// `Ok(None)` for blank lines; `Err` carries a message for the viewer.
pub fn map_input_to_action(line: &str) -> Result<Option<Action>, String> {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        return Ok(None);
    };
    let rest = parts.collect::<Vec<_>>().join(" ");

    let action = match cmd.to_ascii_lowercase().as_str() {
        "q" | "quit" | "exit" => Action::Quit,
        "h" | "help" | "?" => Action::Help,
        "s" | "status" => Action::Status,
        "r" | "retry" => Action::Retry,
        "cat" | "category" => {
            let category = Category::parse(&rest)
                .ok_or_else(|| format!("unknown category {rest:?} (sub, dub or raw)"))?;
            Action::SelectCategory(category)
        }
        "server" => {
            if rest.is_empty() {
                return Err("usage: server <name>".into());
            }
            Action::SelectServer(rest)
        }
        "source" => {
            let n: usize = rest
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| "usage: source <n> (1-based)".to_string())?;
            Action::SelectSource(n - 1)
        }
        other => return Err(format!("unknown command {other:?}; {HELP}")),
    };
    Ok(Some(action))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_session_commands() {
        assert_eq!(map_input_to_action("  "), Ok(None));
        assert_eq!(map_input_to_action("quit"), Ok(Some(Action::Quit)));
        assert_eq!(
            map_input_to_action("cat dub"),
            Ok(Some(Action::SelectCategory(Category::Dub)))
        );
        assert_eq!(
            map_input_to_action("server HD 2"),
            Ok(Some(Action::SelectServer("HD 2".into())))
        );
        assert_eq!(map_input_to_action("source 2"), Ok(Some(Action::SelectSource(1))));
        assert_eq!(map_input_to_action("RETRY"), Ok(Some(Action::Retry)));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(map_input_to_action("source 0").is_err());
        assert!(map_input_to_action("source x").is_err());
        assert!(map_input_to_action("cat klingon").is_err());
        assert!(map_input_to_action("server").is_err());
        assert!(map_input_to_action("dance").is_err());
    }
}
