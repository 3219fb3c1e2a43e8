//! Hash commands.

use super::handler::{bulk_array, bulk_or_null, check_arity, Arity, CommandError, CommandHandler, CommandResult};
use crate::protocol::RespValue;
use bytes::Bytes;

impl CommandHandler {
    /// HSET key field value [field value ...]
    pub(super) fn cmd_hset(&self, args: &[Bytes]) -> CommandResult {
        check_arity("hset", args, Arity::AtLeast(3))?;
        if args.len() % 2 != 1 {
            return Err(CommandError::WrongArity("hset".to_string()));
        }
        let pairs = args[1..]
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect();
        let added = self.keyspace.hset(args[0].clone(), pairs)?;
        Ok(RespValue::integer(added as i64))
    }

    /// HGET key field
    pub(super) fn cmd_hget(&self, args: &[Bytes]) -> CommandResult {
        check_arity("hget", args, Arity::Exact(2))?;
        Ok(bulk_or_null(self.keyspace.hget(&args[0], &args[1])?))
    }

    /// HDEL key field [field ...]
    pub(super) fn cmd_hdel(&self, args: &[Bytes]) -> CommandResult {
        check_arity("hdel", args, Arity::AtLeast(2))?;
        let removed = self.keyspace.hdel(&args[0], &args[1..])?;
        Ok(RespValue::integer(removed as i64))
    }

    /// HGETALL key: flat field, value, field, value... array
    pub(super) fn cmd_hgetall(&self, args: &[Bytes]) -> CommandResult {
        check_arity("hgetall", args, Arity::Exact(1))?;
        let pairs = self.keyspace.hgetall(&args[0])?;
        Ok(bulk_array(
            pairs.into_iter().flat_map(|(field, value)| [field, value]),
        ))
    }

    /// HEXISTS key field
    pub(super) fn cmd_hexists(&self, args: &[Bytes]) -> CommandResult {
        check_arity("hexists", args, Arity::Exact(2))?;
        let exists = self.keyspace.hexists(&args[0], &args[1])?;
        Ok(RespValue::integer(i64::from(exists)))
    }

    /// HLEN key
    pub(super) fn cmd_hlen(&self, args: &[Bytes]) -> CommandResult {
        check_arity("hlen", args, Arity::Exact(1))?;
        Ok(RespValue::integer(self.keyspace.hlen(&args[0])? as i64))
    }
}
