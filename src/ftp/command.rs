/// A control-channel command.
///
/// Verbs are matched case-insensitively. Arguments are kept verbatim, so
/// file names may contain spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    User(String),
    Pass(String),
    Syst,
    Pwd,
    Type(String),
    Noop,
    Pasv,
    List,
    Retr(String),
    Stor(String),
    Dele(String),
    Quit,
    Unknown(String),
}

impl Command {
    /// Parses one control line. Returns `None` for a blank line.
    ///
    /// # Example
    ///
    /// ```
    /// # use switchboard::ftp::command::Command;
    /// assert_eq!(Command::parse("retr my file.g"), Some(Command::Retr("my file.g".into())));
    /// assert_eq!(Command::parse("   "), None);
    /// ```
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb, arg.trim().to_string()),
            None => (line, String::new()),
        };

        let command = match verb.to_ascii_uppercase().as_str() {
            "USER" => Command::User(arg),
            "PASS" => Command::Pass(arg),
            "SYST" => Command::Syst,
            "PWD" | "XPWD" => Command::Pwd,
            "TYPE" => Command::Type(arg),
            "NOOP" => Command::Noop,
            "PASV" => Command::Pasv,
            "LIST" | "NLST" => Command::List,
            "RETR" => Command::Retr(arg),
            "STOR" => Command::Stor(arg),
            "DELE" => Command::Dele(arg),
            "QUIT" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        };
        Some(command)
    }

    /// Verb for logging. Never includes the argument, so passwords stay
    /// out of the logs.
    pub fn verb(&self) -> &str {
        match self {
            Command::User(_) => "USER",
            Command::Pass(_) => "PASS",
            Command::Syst => "SYST",
            Command::Pwd => "PWD",
            Command::Type(_) => "TYPE",
            Command::Noop => "NOOP",
            Command::Pasv => "PASV",
            Command::List => "LIST",
            Command::Retr(_) => "RETR",
            Command::Stor(_) => "STOR",
            Command::Dele(_) => "DELE",
            Command::Quit => "QUIT",
            Command::Unknown(verb) => verb.as_str(),
        }
    }

    pub fn needs_login(&self) -> bool {
        !matches!(
            self,
            Command::User(_)
                | Command::Pass(_)
                | Command::Syst
                | Command::Noop
                | Command::Quit
                | Command::Unknown(_)
        )
    }

    /// Commands that move data over the passive connection.
    pub fn uses_data_connection(&self) -> bool {
        matches!(self, Command::List | Command::Retr(_) | Command::Stor(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbs_are_case_insensitive() {
        assert_eq!(Command::parse("user anonymous"), Some(Command::User("anonymous".into())));
        assert_eq!(Command::parse("Pasv"), Some(Command::Pasv));
        assert_eq!(Command::parse("XPWD"), Some(Command::Pwd));
    }

    #[test]
    fn unknown_verbs_are_kept() {
        assert_eq!(Command::parse("MLSD /"), Some(Command::Unknown("MLSD".into())));
    }

    #[test]
    fn password_is_not_in_verb() {
        let cmd = Command::parse("PASS hunter2").unwrap();
        assert_eq!(cmd.verb(), "PASS");
        assert!(!cmd.needs_login());
    }

    #[test]
    fn data_commands() {
        assert!(Command::List.uses_data_connection());
        assert!(Command::Stor("a".into()).uses_data_connection());
        assert!(!Command::Dele("a".into()).uses_data_connection());
        assert!(Command::Dele("a".into()).needs_login());
    }
}
