// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis-backed [`TableClient`].
//!
//! # Redis Layout
//!
//! ```text
//! {table}:item:{partition}[:{sort}]        HASH  attribute -> "S:<text>" | "N:<int>"
//! {table}:sort:{sortKeyName}:{partition}   ZSET  sort values, score 0 (lexicographic)
//! ```
//!
//! Key segments never contain `:`, so the layout is unambiguous. Items with a
//! time to live get `EXPIREAT`; their sort index members are pruned lazily
//! the next time the partition is queried.
//!
//! Uses `redis::aio::ConnectionManager`, which is multiplexed and reconnects
//! on its own. Cloning the client is cheap.

use super::{AdapterError, AdapterResult, AttributeValue, BoxFuture, TableClient, TableItem, TableKey};
use redis::aio::ConnectionManager;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

/// [`TableClient`] over a Redis connection.
#[derive(Clone)]
pub struct RedisTableClient {
    conn: ConnectionManager,
}

impl RedisTableClient {
    /// Connect to `url`, giving up after `connect_timeout`.
    pub async fn connect(url: &str, connect_timeout: Duration) -> AdapterResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = timeout(connect_timeout, client.get_connection_manager())
            .await
            .map_err(|_| {
                AdapterError::Client(format!(
                    "timed out connecting to redis after {}ms",
                    connect_timeout.as_millis()
                ))
            })??;
        info!(timeout_ms = connect_timeout.as_millis() as u64, "Connected table client to redis");
        Ok(Self { conn })
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn item_key(table: &str, key: &TableKey) -> String {
        match key.sort_value() {
            Some(sort) => format!("{}:item:{}:{}", table, key.partition_value(), sort),
            None => format!("{}:item:{}", table, key.partition_value()),
        }
    }

    fn item_key_for_sort(table: &str, partition: &str, sort: &str) -> String {
        format!("{}:item:{}:{}", table, partition, sort)
    }

    fn sort_index_key(table: &str, sort_key_name: &str, partition: &str) -> String {
        format!("{}:sort:{}:{}", table, sort_key_name, partition)
    }

    fn encode(value: &AttributeValue) -> String {
        match value {
            AttributeValue::S(s) => format!("S:{}", s),
            AttributeValue::N(n) => format!("N:{}", n),
        }
    }

    fn decode(field: &str, raw: &str) -> AdapterResult<AttributeValue> {
        match raw.split_once(':') {
            Some(("S", s)) => Ok(AttributeValue::S(s.to_string())),
            Some(("N", n)) => n
                .parse()
                .map(AttributeValue::N)
                .map_err(|_| AdapterError::Corrupt(format!("attribute {} holds non-numeric {:?}", field, n))),
            _ => Err(AdapterError::Corrupt(format!(
                "attribute {} has no type tag: {:?}",
                field, raw
            ))),
        }
    }
}

impl std::fmt::Debug for RedisTableClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTableClient").finish_non_exhaustive()
    }
}

impl TableClient for RedisTableClient {
    fn put_item<'a>(&'a self, table: &'a str, item: TableItem) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let hash = Self::item_key(table, &item.key);
            let fields: Vec<(String, String)> = item
                .attributes
                .iter()
                .map(|(name, value)| (name.clone(), Self::encode(value)))
                .collect();

            let mut pipe = redis::pipe();
            pipe.atomic();
            pipe.cmd("DEL").arg(&hash).ignore();
            pipe.cmd("HSET").arg(&hash).arg(fields.as_slice()).ignore();
            if let Some(at) = item.expires_at {
                pipe.cmd("EXPIREAT").arg(&hash).arg(at).ignore();
            }
            if let Some((sort_name, sort_value)) = &item.key.sort {
                let index = Self::sort_index_key(table, sort_name, item.key.partition_value());
                pipe.cmd("ZADD").arg(&index).arg(0).arg(sort_value).ignore();
            }
            pipe.query_async::<_, ()>(&mut conn).await?;
            Ok(())
        })
    }

    fn get_item<'a>(
        &'a self,
        table: &'a str,
        key: &'a TableKey,
    ) -> BoxFuture<'a, Option<BTreeMap<String, AttributeValue>>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let raw: HashMap<String, String> = redis::cmd("HGETALL")
                .arg(Self::item_key(table, key))
                .query_async(&mut conn)
                .await?;
            if raw.is_empty() {
                return Ok(None);
            }
            raw.iter()
                .map(|(field, value)| Ok((field.clone(), Self::decode(field, value)?)))
                .collect::<AdapterResult<BTreeMap<_, _>>>()
                .map(Some)
        })
    }

    fn query_sort_keys<'a>(
        &'a self,
        table: &'a str,
        partition: (&'a str, &'a str),
        sort_key_name: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let (_, partition_value) = partition;
            let index = Self::sort_index_key(table, sort_key_name, partition_value);
            let page_size = limit.max(1);

            let mut alive = Vec::new();
            let mut start = 0usize;
            while alive.len() < limit {
                let (first, last) = page_bounds(start, page_size);
                let members: Vec<String> = redis::cmd("ZRANGE")
                    .arg(&index)
                    .arg(first)
                    .arg(last)
                    .query_async(&mut conn)
                    .await?;
                if members.is_empty() {
                    break;
                }
                let fetched = members.len();

                let mut exists = redis::pipe();
                for member in &members {
                    exists
                        .cmd("EXISTS")
                        .arg(Self::item_key_for_sort(table, partition_value, member));
                }
                let present: Vec<bool> = exists.query_async(&mut conn).await?;

                let mut stale = Vec::new();
                for (member, present) in members.into_iter().zip(present) {
                    if present {
                        alive.push(member);
                    } else {
                        stale.push(member);
                    }
                }

                if !stale.is_empty() {
                    debug!(index = %index, pruned = stale.len(), "Pruning expired sort index members");
                    redis::cmd("ZREM")
                        .arg(&index)
                        .arg(stale.as_slice())
                        .query_async::<_, ()>(&mut conn)
                        .await?;
                }

                // pruned members no longer hold a rank
                start += fetched - stale.len();
                if fetched < page_size {
                    break;
                }
            }

            alive.truncate(limit);
            Ok(alive)
        })
    }
}

/// Inclusive `ZRANGE` bounds for the page of `size` members starting at rank `start`.
fn page_bounds(start: usize, size: usize) -> (isize, isize) {
    let first = start as isize;
    (first, first + size as isize - 1)
}
