//! String commands: SET, GET, INCR family, APPEND, STRLEN, MGET, MSET.

use super::handler::{
    bulk_or_null, check_arity, parse_int, parse_ttl, Arity, CommandError, CommandHandler,
    CommandResult,
};
use crate::protocol::RespValue;
use crate::storage::SetCondition;
use bytes::Bytes;

impl CommandHandler {
    /// SET key value [EX seconds | PX milliseconds] [NX | XX]
    pub(super) fn cmd_set(&self, args: &[Bytes]) -> CommandResult {
        check_arity("set", args, Arity::AtLeast(2))?;

        let mut ttl = None;
        let mut condition = SetCondition::Always;
        let mut options = args[2..].iter();
        while let Some(opt) = options.next() {
            let opt = opt.to_ascii_uppercase();
            match opt.as_slice() {
                b"EX" | b"PX" if ttl.is_none() => {
                    let amount = options.next().ok_or(CommandError::Syntax)?;
                    let unit_ms = if opt == b"EX" { 1000 } else { 1 };
                    ttl = Some(
                        parse_ttl("set", amount, unit_ms)?
                            .ok_or_else(|| CommandError::InvalidExpireTime("set".to_string()))?,
                    );
                }
                b"NX" if condition != SetCondition::IfExists => condition = SetCondition::IfMissing,
                b"XX" if condition != SetCondition::IfMissing => condition = SetCondition::IfExists,
                _ => return Err(CommandError::Syntax),
            }
        }

        let written = self
            .keyspace
            .set_with(args[0].clone(), args[1].clone(), ttl, condition);
        Ok(if written {
            RespValue::ok()
        } else {
            RespValue::null()
        })
    }

    /// GET key
    pub(super) fn cmd_get(&self, args: &[Bytes]) -> CommandResult {
        check_arity("get", args, Arity::Exact(1))?;
        Ok(bulk_or_null(self.keyspace.get(&args[0])?))
    }

    /// INCR key
    pub(super) fn cmd_incr(&self, args: &[Bytes]) -> CommandResult {
        check_arity("incr", args, Arity::Exact(1))?;
        Ok(RespValue::integer(self.keyspace.incr_by(&args[0], 1)?))
    }

    /// DECR key
    pub(super) fn cmd_decr(&self, args: &[Bytes]) -> CommandResult {
        check_arity("decr", args, Arity::Exact(1))?;
        Ok(RespValue::integer(self.keyspace.decr_by(&args[0], 1)?))
    }

    /// INCRBY key increment
    pub(super) fn cmd_incrby(&self, args: &[Bytes]) -> CommandResult {
        check_arity("incrby", args, Arity::Exact(2))?;
        let delta = parse_int(&args[1])?;
        Ok(RespValue::integer(self.keyspace.incr_by(&args[0], delta)?))
    }

    /// DECRBY key decrement
    pub(super) fn cmd_decrby(&self, args: &[Bytes]) -> CommandResult {
        check_arity("decrby", args, Arity::Exact(2))?;
        let delta = parse_int(&args[1])?;
        Ok(RespValue::integer(self.keyspace.decr_by(&args[0], delta)?))
    }

    /// APPEND key value
    pub(super) fn cmd_append(&self, args: &[Bytes]) -> CommandResult {
        check_arity("append", args, Arity::Exact(2))?;
        let len = self.keyspace.append(&args[0], &args[1])?;
        Ok(RespValue::integer(len as i64))
    }

    /// STRLEN key
    pub(super) fn cmd_strlen(&self, args: &[Bytes]) -> CommandResult {
        check_arity("strlen", args, Arity::Exact(1))?;
        Ok(RespValue::integer(self.keyspace.strlen(&args[0])? as i64))
    }

    /// MGET key [key ...]
    pub(super) fn cmd_mget(&self, args: &[Bytes]) -> CommandResult {
        check_arity("mget", args, Arity::AtLeast(1))?;
        let values = self
            .keyspace
            .mget(args)
            .into_iter()
            .map(bulk_or_null)
            .collect();
        Ok(RespValue::array(values))
    }

    /// MSET key value [key value ...]
    pub(super) fn cmd_mset(&self, args: &[Bytes]) -> CommandResult {
        check_arity("mset", args, Arity::AtLeast(2))?;
        if args.len() % 2 != 0 {
            return Err(CommandError::WrongArity("mset".to_string()));
        }
        for pair in args.chunks_exact(2) {
            self.keyspace.set(pair[0].clone(), pair[1].clone());
        }
        Ok(RespValue::ok())
    }
}
