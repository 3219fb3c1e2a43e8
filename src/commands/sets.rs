//! Set commands.

use super::handler::{bulk_array, check_arity, Arity, CommandHandler, CommandResult};
use crate::protocol::RespValue;
use bytes::Bytes;

impl CommandHandler {
    /// SADD key member [member ...]
    pub(super) fn cmd_sadd(&self, args: &[Bytes]) -> CommandResult {
        check_arity("sadd", args, Arity::AtLeast(2))?;
        let added = self.keyspace.sadd(args[0].clone(), args[1..].to_vec())?;
        Ok(RespValue::integer(added as i64))
    }

    /// SREM key member [member ...]
    pub(super) fn cmd_srem(&self, args: &[Bytes]) -> CommandResult {
        check_arity("srem", args, Arity::AtLeast(2))?;
        let removed = self.keyspace.srem(&args[0], &args[1..])?;
        Ok(RespValue::integer(removed as i64))
    }

    /// SMEMBERS key
    pub(super) fn cmd_smembers(&self, args: &[Bytes]) -> CommandResult {
        check_arity("smembers", args, Arity::Exact(1))?;
        Ok(bulk_array(self.keyspace.smembers(&args[0])?))
    }

    /// SISMEMBER key member
    pub(super) fn cmd_sismember(&self, args: &[Bytes]) -> CommandResult {
        check_arity("sismember", args, Arity::Exact(2))?;
        let member = self.keyspace.sismember(&args[0], &args[1])?;
        Ok(RespValue::integer(i64::from(member)))
    }

    /// SCARD key
    pub(super) fn cmd_scard(&self, args: &[Bytes]) -> CommandResult {
        check_arity("scard", args, Arity::Exact(1))?;
        Ok(RespValue::integer(self.keyspace.scard(&args[0])? as i64))
    }
}
