use crate::backend::error::{BackendError, Result};
use crate::geo::Bounds;
use redis::{FromRedisValue, RedisResult, Value};
use std::fmt;

/// A single Tile38 request: verb plus positional arguments.
///
/// Tile38 accepts every argument as a bulk string, so arguments are kept
/// pre-rendered. Constructors cover the verbs the relay issues.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: String,
    args: Vec<String>,
}

impl Command {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }

    fn bounds(self, bounds: &Bounds) -> Self {
        let [min_lat, min_lng, max_lat, max_lng] = bounds.to_args();
        self.arg("BOUNDS")
            .arg(min_lat)
            .arg(min_lng)
            .arg(max_lat)
            .arg(max_lng)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub(crate) fn to_redis(&self) -> redis::Cmd {
        let mut cmd = redis::cmd(&self.name);
        for arg in &self.args {
            cmd.arg(arg);
        }
        cmd
    }

    pub fn ping() -> Self {
        Self::new("PING")
    }

    /// SET key id EX ttl OBJECT geojson
    pub fn set_object(collection: &str, id: &str, ttl_seconds: u64, geojson: &str) -> Self {
        Self::new("SET")
            .arg(collection)
            .arg(id)
            .arg("EX")
            .arg(ttl_seconds)
            .arg("OBJECT")
            .arg(geojson)
    }

    pub fn del(collection: &str, id: &str) -> Self {
        Self::new("DEL").arg(collection).arg(id)
    }

    /// INTERSECTS key CURSOR c BOUNDS ... (full objects)
    pub fn intersects_bounds(collection: &str, cursor: i64, bounds: &Bounds) -> Self {
        Self::new("INTERSECTS")
            .arg(collection)
            .arg("CURSOR")
            .arg(cursor)
            .bounds(bounds)
    }

    /// INTERSECTS key CURSOR c IDS OBJECT geojson (ids only)
    pub fn intersects_ids_object(collection: &str, cursor: i64, geojson: &str) -> Self {
        Self::new("INTERSECTS")
            .arg(collection)
            .arg("CURSOR")
            .arg(cursor)
            .arg("IDS")
            .arg("OBJECT")
            .arg(geojson)
    }

    /// NEARBY key CURSOR c IDS POINT lat lng meters
    pub fn nearby_ids(collection: &str, cursor: i64, lat: f64, lng: f64, meters: f64) -> Self {
        Self::new("NEARBY")
            .arg(collection)
            .arg("CURSOR")
            .arg(cursor)
            .arg("IDS")
            .arg("POINT")
            .arg(lat)
            .arg(lng)
            .arg(meters)
    }

    /// Roaming fence: every object learns about others within `meters`
    pub fn setchan_roam(channel: &str, collection: &str, meters: f64) -> Self {
        Self::new("SETCHAN")
            .arg(channel)
            .arg("NEARBY")
            .arg(collection)
            .arg("FENCE")
            .arg("ROAM")
            .arg(collection)
            .arg("*")
            .arg(meters)
    }

    /// Whole-world fence reporting every set/del in the collection
    pub fn setchan_world(channel: &str, collection: &str) -> Self {
        Self::new("SETCHAN")
            .arg(channel)
            .arg("INTERSECTS")
            .arg(collection)
            .arg("FENCE")
            .arg("COMMANDS")
            .arg("set,del")
            .bounds(&Bounds::world())
    }

    /// Static polygon fence reporting enter/exit
    pub fn setchan_place(channel: &str, collection: &str, geojson: &str) -> Self {
        Self::new("SETCHAN")
            .arg(channel)
            .arg("WITHIN")
            .arg(collection)
            .arg("FENCE")
            .arg("DETECT")
            .arg("enter,exit")
            .arg("OBJECT")
            .arg(geojson)
    }

    /// Per-connection viewport fence reporting exits, expiring after `ttl_seconds`
    pub fn setchan_viewport(
        channel: &str,
        ttl_seconds: u64,
        collection: &str,
        bounds: &Bounds,
    ) -> Self {
        Self::new("SETCHAN")
            .arg(channel)
            .arg("EX")
            .arg(ttl_seconds)
            .arg("INTERSECTS")
            .arg(collection)
            .arg("FENCE")
            .arg("DETECT")
            .arg("exit")
            .bounds(bounds)
    }

    pub fn delchan(channel: &str) -> Self {
        Self::new("DELCHAN").arg(channel)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// A RESP reply reduced to the shapes Tile38 produces
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    Int(i64),
    Text(String),
    Array(Vec<Reply>),
}

/// One page of a cursor-paginated search
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub cursor: i64,
    pub items: Vec<Reply>,
}

impl Reply {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Reply::Int(n) => Some(*n),
            Reply::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Reply::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Reply]> {
        match self {
            Reply::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Reply>> {
        match self {
            Reply::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Split a `[cursor, [items...]]` search reply.
    ///
    /// Fewer than two elements means "no results" rather than an error.
    pub fn into_page(self) -> Result<Option<Page>> {
        let mut parts = match self {
            Reply::Array(parts) if parts.len() >= 2 => parts,
            _ => return Ok(None),
        };
        let items = parts.swap_remove(1).into_array().unwrap_or_default();
        let cursor = parts[0]
            .as_int()
            .ok_or_else(|| BackendError::UnexpectedReply(format!("bad cursor {:?}", parts[0])))?;
        Ok(Some(Page { cursor, items }))
    }
}

impl FromRedisValue for Reply {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        Ok(match v {
            Value::Nil => Reply::Nil,
            Value::Int(n) => Reply::Int(*n),
            Value::Boolean(b) => Reply::Int(i64::from(*b)),
            Value::Double(d) => Reply::Text(d.to_string()),
            Value::Okay => Reply::Text("OK".to_string()),
            Value::SimpleString(s) => Reply::Text(s.clone()),
            Value::BulkString(bytes) => Reply::Text(String::from_utf8_lossy(bytes).into_owned()),
            Value::VerbatimString { text, .. } => Reply::Text(text.clone()),
            Value::Array(items) | Value::Set(items) => Reply::Array(
                items
                    .iter()
                    .map(Reply::from_redis_value)
                    .collect::<RedisResult<Vec<_>>>()?,
            ),
            other => {
                return Err(redis::RedisError::from((
                    redis::ErrorKind::TypeError,
                    "Unsupported reply type",
                    format!("{:?}", other),
                )))
            }
        })
    }
}
