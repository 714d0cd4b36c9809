use std::fmt;

/// Command tags carried alongside a request.
///
/// The tag is bookkeeping only: the wire always carries the string form
/// returned by [`Command::name`]. Commands the crate has no special handling
/// for travel as `Other` with their free-form name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Append,
    Auth,
    Del,
    Discard,
    Exec,
    Expire,
    Get,
    Hello,
    Hget,
    Hgetall,
    Hset,
    Incr,
    Keys,
    Lpop,
    Lpush,
    Lrange,
    Multi,
    Ping,
    Psubscribe,
    Publish,
    Punsubscribe,
    Quit,
    Rpush,
    Sadd,
    Set,
    Smembers,
    Subscribe,
    Ttl,
    Unsubscribe,
    Zadd,
    Zrange,
    Other(String),
}

impl Command {
    /// The name as it appears on the wire.
    pub fn name(&self) -> &str {
        match self {
            Command::Append => "APPEND",
            Command::Auth => "AUTH",
            Command::Del => "DEL",
            Command::Discard => "DISCARD",
            Command::Exec => "EXEC",
            Command::Expire => "EXPIRE",
            Command::Get => "GET",
            Command::Hello => "HELLO",
            Command::Hget => "HGET",
            Command::Hgetall => "HGETALL",
            Command::Hset => "HSET",
            Command::Incr => "INCR",
            Command::Keys => "KEYS",
            Command::Lpop => "LPOP",
            Command::Lpush => "LPUSH",
            Command::Lrange => "LRANGE",
            Command::Multi => "MULTI",
            Command::Ping => "PING",
            Command::Psubscribe => "PSUBSCRIBE",
            Command::Publish => "PUBLISH",
            Command::Punsubscribe => "PUNSUBSCRIBE",
            Command::Quit => "QUIT",
            Command::Rpush => "RPUSH",
            Command::Sadd => "SADD",
            Command::Set => "SET",
            Command::Smembers => "SMEMBERS",
            Command::Subscribe => "SUBSCRIBE",
            Command::Ttl => "TTL",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Zadd => "ZADD",
            Command::Zrange => "ZRANGE",
            Command::Other(name) => name,
        }
    }

    /// Whether the server answers this command with a push frame instead of
    /// a regular response. Push responses are never matched against the
    /// pending queue, so these commands contribute no tag to a request.
    pub fn has_push_response(&self) -> bool {
        matches!(
            self,
            Command::Subscribe
                | Command::Unsubscribe
                | Command::Psubscribe
                | Command::Punsubscribe
        )
    }
}

impl From<&str> for Command {
    fn from(name: &str) -> Self {
        match name.to_uppercase().as_str() {
            "APPEND" => Command::Append,
            "AUTH" => Command::Auth,
            "DEL" => Command::Del,
            "DISCARD" => Command::Discard,
            "EXEC" => Command::Exec,
            "EXPIRE" => Command::Expire,
            "GET" => Command::Get,
            "HELLO" => Command::Hello,
            "HGET" => Command::Hget,
            "HGETALL" => Command::Hgetall,
            "HSET" => Command::Hset,
            "INCR" => Command::Incr,
            "KEYS" => Command::Keys,
            "LPOP" => Command::Lpop,
            "LPUSH" => Command::Lpush,
            "LRANGE" => Command::Lrange,
            "MULTI" => Command::Multi,
            "PING" => Command::Ping,
            "PSUBSCRIBE" => Command::Psubscribe,
            "PUBLISH" => Command::Publish,
            "PUNSUBSCRIBE" => Command::Punsubscribe,
            "QUIT" => Command::Quit,
            "RPUSH" => Command::Rpush,
            "SADD" => Command::Sadd,
            "SET" => Command::Set,
            "SMEMBERS" => Command::Smembers,
            "SUBSCRIBE" => Command::Subscribe,
            "TTL" => Command::Ttl,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ZADD" => Command::Zadd,
            "ZRANGE" => Command::Zrange,
            other => Command::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_round_trips_through_from_str() {
        for cmd in [
            Command::Get,
            Command::Hgetall,
            Command::Multi,
            Command::Psubscribe,
        ] {
            assert_eq!(Command::from(cmd.name()), cmd);
        }
    }

    #[test]
    fn from_str_is_case_insensitive() {
        assert_eq!(Command::from("get"), Command::Get);
        assert_eq!(Command::from("Subscribe"), Command::Subscribe);
    }

    #[test]
    fn unknown_names_become_other() {
        let cmd = Command::from("object");
        assert_eq!(cmd, Command::Other("OBJECT".to_string()));
        assert_eq!(cmd.name(), "OBJECT");
        assert!(!cmd.has_push_response());
    }

    #[test]
    fn subscribe_family_has_push_responses() {
        assert!(Command::Subscribe.has_push_response());
        assert!(Command::Unsubscribe.has_push_response());
        assert!(Command::Psubscribe.has_push_response());
        assert!(Command::Punsubscribe.has_push_response());
        assert!(!Command::Publish.has_push_response());
        assert!(!Command::Multi.has_push_response());
    }
}
