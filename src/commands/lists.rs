//! List commands.

use super::handler::{bulk_array, bulk_or_null, check_arity, parse_int, Arity, CommandHandler, CommandResult};
use crate::protocol::RespValue;
use bytes::Bytes;

impl CommandHandler {
    /// LPUSH key value [value ...]
    pub(super) fn cmd_lpush(&self, args: &[Bytes]) -> CommandResult {
        check_arity("lpush", args, Arity::AtLeast(2))?;
        let len = self.keyspace.lpush(args[0].clone(), args[1..].to_vec())?;
        Ok(RespValue::integer(len as i64))
    }

    /// RPUSH key value [value ...]
    pub(super) fn cmd_rpush(&self, args: &[Bytes]) -> CommandResult {
        check_arity("rpush", args, Arity::AtLeast(2))?;
        let len = self.keyspace.rpush(args[0].clone(), args[1..].to_vec())?;
        Ok(RespValue::integer(len as i64))
    }

    /// LPOP key
    pub(super) fn cmd_lpop(&self, args: &[Bytes]) -> CommandResult {
        check_arity("lpop", args, Arity::Exact(1))?;
        Ok(bulk_or_null(self.keyspace.lpop(&args[0])?))
    }

    /// RPOP key
    pub(super) fn cmd_rpop(&self, args: &[Bytes]) -> CommandResult {
        check_arity("rpop", args, Arity::Exact(1))?;
        Ok(bulk_or_null(self.keyspace.rpop(&args[0])?))
    }

    /// LLEN key
    pub(super) fn cmd_llen(&self, args: &[Bytes]) -> CommandResult {
        check_arity("llen", args, Arity::Exact(1))?;
        Ok(RespValue::integer(self.keyspace.llen(&args[0])? as i64))
    }

    /// LINDEX key index
    pub(super) fn cmd_lindex(&self, args: &[Bytes]) -> CommandResult {
        check_arity("lindex", args, Arity::Exact(2))?;
        let index = parse_int(&args[1])?;
        Ok(bulk_or_null(self.keyspace.lindex(&args[0], index)?))
    }

    /// LRANGE key start stop
    pub(super) fn cmd_lrange(&self, args: &[Bytes]) -> CommandResult {
        check_arity("lrange", args, Arity::Exact(3))?;
        let start = parse_int(&args[1])?;
        let stop = parse_int(&args[2])?;
        Ok(bulk_array(self.keyspace.lrange(&args[0], start, stop)?))
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::handler::tests::{create_handler, run};
    use crate::protocol::RespValue;
    use bytes::Bytes;

    fn bulk(items: &[&str]) -> RespValue {
        RespValue::array(
            items
                .iter()
                .map(|s| RespValue::bulk_string(Bytes::from(s.to_string())))
                .collect(),
        )
    }

    #[test]
    fn test_push_order() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["LPUSH", "l", "a", "b", "c"]), RespValue::integer(3));
        assert_eq!(run(&handler, &["LRANGE", "l", "0", "-1"]), bulk(&["c", "b", "a"]));

        assert_eq!(run(&handler, &["RPUSH", "r", "a", "b", "c"]), RespValue::integer(3));
        assert_eq!(run(&handler, &["LRANGE", "r", "0", "-1"]), bulk(&["a", "b", "c"]));
    }

    #[test]
    fn test_lrange_bounds() {
        let handler = create_handler();
        run(&handler, &["RPUSH", "l", "a", "b", "c"]);

        assert_eq!(run(&handler, &["LRANGE", "l", "-1", "-1"]), bulk(&["c"]));
        assert_eq!(run(&handler, &["LRANGE", "l", "-100", "1"]), bulk(&["a", "b"]));
        assert_eq!(run(&handler, &["LRANGE", "l", "1", "100"]), bulk(&["b", "c"]));
        assert_eq!(run(&handler, &["LRANGE", "l", "2", "1"]), bulk(&[]));
        assert_eq!(run(&handler, &["LRANGE", "missing", "0", "-1"]), bulk(&[]));
        assert_eq!(
            run(&handler, &["LRANGE", "l", "zero", "1"]),
            RespValue::error("ERR value is not an integer or out of range")
        );
    }

    #[test]
    fn test_pop_and_len() {
        let handler = create_handler();
        run(&handler, &["RPUSH", "l", "a", "b"]);

        assert_eq!(run(&handler, &["LLEN", "l"]), RespValue::integer(2));
        assert_eq!(
            run(&handler, &["LPOP", "l"]),
            RespValue::bulk_string(Bytes::from("a"))
        );
        assert_eq!(
            run(&handler, &["RPOP", "l"]),
            RespValue::bulk_string(Bytes::from("b"))
        );
        assert_eq!(run(&handler, &["LPOP", "l"]), RespValue::null());

        // The emptied list no longer exists.
        assert_eq!(run(&handler, &["EXISTS", "l"]), RespValue::integer(0));
        assert_eq!(run(&handler, &["LLEN", "l"]), RespValue::integer(0));
    }

    #[test]
    fn test_lindex() {
        let handler = create_handler();
        run(&handler, &["RPUSH", "l", "a", "b", "c"]);

        assert_eq!(
            run(&handler, &["LINDEX", "l", "0"]),
            RespValue::bulk_string(Bytes::from("a"))
        );
        assert_eq!(
            run(&handler, &["LINDEX", "l", "-1"]),
            RespValue::bulk_string(Bytes::from("c"))
        );
        assert_eq!(run(&handler, &["LINDEX", "l", "3"]), RespValue::null());
    }

    #[test]
    fn test_list_commands_on_string() {
        let handler = create_handler();
        run(&handler, &["SET", "s", "v"]);

        let wrongtype =
            RespValue::error("WRONGTYPE Operation against a key holding the wrong kind of value");
        assert_eq!(run(&handler, &["LPUSH", "s", "x"]), wrongtype);
        assert_eq!(run(&handler, &["LRANGE", "s", "0", "-1"]), wrongtype);
        assert_eq!(run(&handler, &["LPOP", "s"]), wrongtype);
        assert_eq!(
            run(&handler, &["GET", "s"]),
            RespValue::bulk_string(Bytes::from("v"))
        );
    }
}
