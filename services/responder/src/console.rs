//! Operator commands read from stdin

use std::str::FromStr;

use errors::ResponderError;

pub const HELP: &str = "\
Commands:
  facilities                         list the facility directory
  select <name>                      select a facility and start polling
  clear                              clear the selection and stop polling
  register <name>|<location>|<region>|<category>
                                     register a new facility
  push                               enable push notifications
  deliver <json>                     inject a push payload
  gone <404|410>                     push service rejected the subscription
  view                               click 'view' on the shown notification
  close                              click 'dismiss' on the shown notification
  dismiss                            acknowledge the active alert
  resolve <location>                 list facilities near a location
  status                             show session state
  help                               show this help
  quit                               exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Facilities,
    Select(String),
    Clear,
    Register {
        name: String,
        location: String,
        region: String,
        category: String,
    },
    EnablePush,
    Deliver(String),
    /// Push service answered the subscription endpoint with this status
    PushGone(u16),
    View,
    CloseNotification,
    Dismiss,
    Resolve(String),
    Status,
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = ResponderError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let argument = |what: &str| -> Result<String, ResponderError> {
            if rest.is_empty() {
                Err(ResponderError::validation(what, format!("{} needs <{}>", verb, what)))
            } else {
                Ok(rest.to_string())
            }
        };

        Ok(match verb.to_lowercase().as_str() {
            "facilities" | "list" => Self::Facilities,
            "select" => Self::Select(argument("name")?),
            "clear" => Self::Clear,
            "register" => {
                let mut fields = rest.split('|').map(str::trim);
                let mut next = || fields.next().unwrap_or_default().to_string();
                Self::Register {
                    name: next(),
                    location: next(),
                    region: next(),
                    category: next(),
                }
            },
            "push" => Self::EnablePush,
            "deliver" => Self::Deliver(argument("json")?),
            "gone" => {
                let status = argument("status")?;
                Self::PushGone(status.parse().map_err(|_| {
                    ResponderError::validation("status", format!("'{}' is not an HTTP status", status))
                })?)
            },
            "view" => Self::View,
            "close" => Self::CloseNotification,
            "dismiss" | "ack" => Self::Dismiss,
            "resolve" => Self::Resolve(argument("location")?),
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => {
                return Err(ResponderError::validation(
                    "command",
                    format!("unknown command '{}', try 'help'", other),
                ))
            },
        })
    }
}
