//! Structure hydration and parameter packing.
//!
//! The raw PackStream layer only knows tags and field lists. This module
//! turns those into [`Value`]s and back, using the field layouts of the
//! negotiated protocol version: element ids widen graph structures from 5.0,
//! and zoned date-times switch from local-clock to UTC seconds at the same
//! point. Integer handling follows the configured [`IntegerMode`] in both
//! directions.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use super::error::{DriverError, DriverResult};
use super::types::{
    DateTimeZoneId, Duration, Node, Path, Point, Relationship, Time, UnboundRelationship, Value,
};
use crate::bolt::packstream::structures;
use crate::bolt::{BoltVersion, Capabilities, PackStreamMap, PackStreamStructure, PackStreamValue};

/// Days between 0001-01-01 (day 1 of the common era) and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// How integers received from the server are represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IntegerMode {
    /// Exact `Value::Integer(i64)`
    #[default]
    Lossless,
    /// Native doubles; large values lose precision
    Float,
    /// `Value::BigInt(i128)`; packing rejects values outside the i64 range
    BigInt,
}

/// Per-connection conversion settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HydrationOptions {
    /// Negotiated version, reported in unsupported-type errors
    pub version: BoltVersion,
    /// Integer representation
    pub integer_mode: IntegerMode,
    /// Graph structures carry element ids
    pub element_ids: bool,
    /// Zoned date-times count seconds in UTC
    pub utc_datetime: bool,
}

impl Default for HydrationOptions {
    fn default() -> Self {
        Self::new(BoltVersion::V5_4, IntegerMode::default())
    }
}

impl HydrationOptions {
    /// Options matching a negotiated version.
    pub fn new(version: BoltVersion, integer_mode: IntegerMode) -> Self {
        let capabilities = Capabilities::for_version(version);
        Self {
            version,
            integer_mode,
            element_ids: capabilities.element_ids,
            utc_datetime: capabilities.utc_datetime,
        }
    }

    /// Turn a raw value into a driver value.
    pub fn hydrate(&self, raw: PackStreamValue) -> DriverResult<Value> {
        Ok(match raw {
            PackStreamValue::Null => Value::Null,
            PackStreamValue::Boolean(b) => Value::Boolean(b),
            PackStreamValue::Integer(i) => match self.integer_mode {
                IntegerMode::Lossless => Value::Integer(i),
                IntegerMode::Float => Value::Float(i as f64),
                IntegerMode::BigInt => Value::BigInt(i as i128),
            },
            PackStreamValue::Float(f) => Value::Float(f),
            PackStreamValue::Bytes(b) => Value::Bytes(b),
            PackStreamValue::String(s) => Value::String(s),
            PackStreamValue::List(items) => Value::List(
                items
                    .into_iter()
                    .map(|v| self.hydrate(v))
                    .collect::<DriverResult<_>>()?,
            ),
            PackStreamValue::Map(map) => Value::Map(self.hydrate_map(map)?),
            PackStreamValue::Structure(s) => self.hydrate_structure(s)?,
        })
    }

    /// Hydrate every entry of a map.
    pub fn hydrate_map(&self, map: PackStreamMap) -> DriverResult<HashMap<String, Value>> {
        map.into_iter()
            .map(|(k, v)| Ok((k, self.hydrate(v)?)))
            .collect()
    }

    fn hydrate_structure(&self, s: PackStreamStructure) -> DriverResult<Value> {
        let expected = structures::field_count(s.tag, self.element_ids).ok_or_else(|| {
            DriverError::protocol(format!("Unknown structure tag 0x{:02X}", s.tag))
        })?;
        s.expect_fields(expected)?;

        let tag = s.tag;
        let mut f = Fields::new(s);
        let value = match tag {
            structures::NODE => Value::Node(self.node(&mut f)?),
            structures::RELATIONSHIP => Value::Relationship(self.relationship(&mut f)?),
            structures::UNBOUND_RELATIONSHIP => {
                Value::UnboundRelationship(self.unbound_relationship(&mut f)?)
            }
            structures::PATH => Value::Path(self.path(&mut f)?),
            structures::POINT_2D => {
                Value::Point(Point::new_2d(f.srid()?, f.float("x")?, f.float("y")?))
            }
            structures::POINT_3D => Value::Point(Point::new_3d(
                f.srid()?,
                f.float("x")?,
                f.float("y")?,
                f.float("z")?,
            )),
            structures::DATE => Value::Date(date_from_epoch_days(f.int("days")?)?),
            structures::TIME => Value::Time(Time {
                time: time_from_nanos(f.int("nanoseconds")?)?,
                offset_seconds: f.offset()?,
            }),
            structures::LOCAL_TIME => Value::LocalTime(time_from_nanos(f.int("nanoseconds")?)?),
            structures::LOCAL_DATE_TIME => {
                let seconds = f.int("seconds")?;
                let nanos = f.int("nanoseconds")?;
                Value::LocalDateTime(utc_from_parts(seconds, nanos)?.naive_utc())
            }
            structures::DATE_TIME_OFFSET | structures::DATE_TIME_OFFSET_LEGACY => {
                let seconds = f.int("seconds")?;
                let nanos = f.int("nanoseconds")?;
                let offset_seconds = f.offset()?;
                let offset = FixedOffset::east_opt(offset_seconds).ok_or_else(|| {
                    DriverError::protocol(format!("Invalid UTC offset {}", offset_seconds))
                })?;
                let utc_seconds = if tag == structures::DATE_TIME_OFFSET {
                    seconds
                } else {
                    seconds - offset_seconds as i64
                };
                Value::DateTime(utc_from_parts(utc_seconds, nanos)?.with_timezone(&offset))
            }
            structures::DATE_TIME_ZONE_ID | structures::DATE_TIME_ZONE_ID_LEGACY => {
                Value::DateTimeZoneId(DateTimeZoneId {
                    seconds: f.int("seconds")?,
                    nanoseconds: f.int("nanoseconds")?,
                    zone_id: f.string("zone_id")?,
                    utc: tag == structures::DATE_TIME_ZONE_ID,
                })
            }
            structures::DURATION => Value::Duration(Duration {
                months: f.int("months")?,
                days: f.int("days")?,
                seconds: f.int("seconds")?,
                nanoseconds: i32::try_from(f.int("nanoseconds")?)
                    .map_err(|_| DriverError::protocol("Duration nanoseconds out of range"))?,
            }),
            other => {
                return Err(DriverError::protocol(format!("Unknown structure tag 0x{:02X}", other)))
            }
        };
        Ok(value)
    }

    fn node(&self, f: &mut Fields) -> DriverResult<Node> {
        let id = f.int("id")?;
        let labels = f.string_list("labels")?;
        let properties = self.hydrate_map(f.map("properties")?)?;
        let element_id = if self.element_ids { f.string("element_id")? } else { id.to_string() };
        Ok(Node {
            id,
            labels,
            properties,
            element_id,
        })
    }

    fn relationship(&self, f: &mut Fields) -> DriverResult<Relationship> {
        let id = f.int("id")?;
        let start_node_id = f.int("start_node_id")?;
        let end_node_id = f.int("end_node_id")?;
        let rel_type = f.string("type")?;
        let properties = self.hydrate_map(f.map("properties")?)?;
        let (element_id, start_node_element_id, end_node_element_id) = if self.element_ids {
            (
                f.string("element_id")?,
                f.string("start_node_element_id")?,
                f.string("end_node_element_id")?,
            )
        } else {
            (id.to_string(), start_node_id.to_string(), end_node_id.to_string())
        };
        Ok(Relationship {
            id,
            start_node_id,
            end_node_id,
            rel_type,
            properties,
            element_id,
            start_node_element_id,
            end_node_element_id,
        })
    }

    fn unbound_relationship(&self, f: &mut Fields) -> DriverResult<UnboundRelationship> {
        let id = f.int("id")?;
        let rel_type = f.string("type")?;
        let properties = self.hydrate_map(f.map("properties")?)?;
        let element_id = if self.element_ids { f.string("element_id")? } else { id.to_string() };
        Ok(UnboundRelationship {
            id,
            rel_type,
            properties,
            element_id,
        })
    }

    /// Rebuild a path from its distinct nodes, distinct relationships and
    /// the index sequence `[rel, node, rel, node, ...]`. Relationship indices
    /// are 1-based; a negative index walks the relationship backwards.
    fn path(&self, f: &mut Fields) -> DriverResult<Path> {
        let nodes = f
            .list("nodes")?
            .into_iter()
            .map(|raw| match self.hydrate(raw)? {
                Value::Node(n) => Ok(n),
                other => Err(DriverError::protocol(format!(
                    "Path nodes must be Node, got {}",
                    other.type_name()
                ))),
            })
            .collect::<DriverResult<Vec<_>>>()?;
        let relationships = f
            .list("relationships")?
            .into_iter()
            .map(|raw| match self.hydrate(raw)? {
                Value::UnboundRelationship(r) => Ok(r),
                Value::Relationship(r) => Ok(UnboundRelationship {
                    id: r.id,
                    rel_type: r.rel_type,
                    properties: r.properties,
                    element_id: r.element_id,
                }),
                other => Err(DriverError::protocol(format!(
                    "Path relationships must be UnboundRelationship, got {}",
                    other.type_name()
                ))),
            })
            .collect::<DriverResult<Vec<_>>>()?;
        let indices = f
            .list("indices")?
            .into_iter()
            .map(|v| v.as_int().ok_or_else(|| DriverError::protocol("Path indices must be integers")))
            .collect::<DriverResult<Vec<_>>>()?;

        build_path(nodes, relationships, &indices)
    }

    /// Convert a driver value into a parameter value.
    ///
    /// Fails before anything is written for graph entities, integers that
    /// do not fit the wire and zoned date-times in the wrong basis.
    pub fn pack(&self, value: &Value) -> DriverResult<PackStreamValue> {
        Ok(match value {
            Value::Null => PackStreamValue::Null,
            Value::Boolean(b) => PackStreamValue::Boolean(*b),
            Value::Integer(i) => PackStreamValue::Integer(*i),
            Value::BigInt(i) => PackStreamValue::Integer(i64::try_from(*i).map_err(|_| {
                DriverError::Packing(format!("Integer {} does not fit in 64 bits", i))
            })?),
            Value::Float(f) => PackStreamValue::Float(*f),
            Value::String(s) => PackStreamValue::String(s.clone()),
            Value::Bytes(b) => PackStreamValue::Bytes(b.clone()),
            Value::List(items) => PackStreamValue::List(
                items.iter().map(|v| self.pack(v)).collect::<DriverResult<_>>()?,
            ),
            Value::Map(map) => PackStreamValue::Map(self.pack_map(map)?),
            Value::Node(_)
            | Value::Relationship(_)
            | Value::UnboundRelationship(_)
            | Value::Path(_) => {
                return Err(DriverError::Packing(format!(
                    "{} values can be received but not sent as parameters",
                    value.type_name()
                )))
            }
            Value::Point(p) => match p.z {
                None => structure(
                    structures::POINT_2D,
                    vec![(p.srid as i64).into(), p.x.into(), p.y.into()],
                ),
                Some(z) => structure(
                    structures::POINT_3D,
                    vec![(p.srid as i64).into(), p.x.into(), p.y.into(), z.into()],
                ),
            },
            Value::Date(d) => structure(structures::DATE, vec![epoch_days(d).into()]),
            Value::Time(t) => structure(
                structures::TIME,
                vec![nanos_of_day(&t.time).into(), (t.offset_seconds as i64).into()],
            ),
            Value::LocalTime(t) => structure(structures::LOCAL_TIME, vec![nanos_of_day(t).into()]),
            Value::LocalDateTime(dt) => {
                let utc = dt.and_utc();
                structure(
                    structures::LOCAL_DATE_TIME,
                    vec![utc.timestamp().into(), (utc.timestamp_subsec_nanos() as i64).into()],
                )
            }
            Value::DateTime(dt) => {
                let offset = dt.offset().local_minus_utc() as i64;
                let nanos = dt.timestamp_subsec_nanos() as i64;
                if self.utc_datetime {
                    structure(
                        structures::DATE_TIME_OFFSET,
                        vec![dt.timestamp().into(), nanos.into(), offset.into()],
                    )
                } else {
                    structure(
                        structures::DATE_TIME_OFFSET_LEGACY,
                        vec![(dt.timestamp() + offset).into(), nanos.into(), offset.into()],
                    )
                }
            }
            Value::DateTimeZoneId(dt) => {
                if dt.utc != self.utc_datetime {
                    return Err(DriverError::UnsupportedType {
                        type_name: "DateTimeZoneId",
                        version: self.version.to_string(),
                    });
                }
                let tag = if dt.utc {
                    structures::DATE_TIME_ZONE_ID
                } else {
                    structures::DATE_TIME_ZONE_ID_LEGACY
                };
                structure(
                    tag,
                    vec![dt.seconds.into(), dt.nanoseconds.into(), dt.zone_id.as_str().into()],
                )
            }
            Value::Duration(d) => structure(
                structures::DURATION,
                vec![
                    d.months.into(),
                    d.days.into(),
                    d.seconds.into(),
                    (d.nanoseconds as i64).into(),
                ],
            ),
        })
    }

    /// Pack a parameter map.
    pub fn pack_map(&self, map: &HashMap<String, Value>) -> DriverResult<PackStreamMap> {
        map.iter()
            .map(|(k, v)| Ok((k.clone(), self.pack(v)?)))
            .collect()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn structure(tag: u8, fields: Vec<PackStreamValue>) -> PackStreamValue {
    PackStreamStructure::new(tag, fields).into()
}

fn build_path(
    nodes: Vec<Node>,
    relationships: Vec<UnboundRelationship>,
    indices: &[i64],
) -> DriverResult<Path> {
    let first = nodes
        .first()
        .cloned()
        .ok_or_else(|| DriverError::protocol("Path without nodes"))?;
    if indices.len() % 2 != 0 {
        return Err(DriverError::protocol("Path index sequence has odd length"));
    }

    let mut path_nodes = vec![first];
    let mut path_rels = Vec::with_capacity(indices.len() / 2);
    let mut prev = 0usize;

    for pair in indices.chunks(2) {
        let (rel_index, node_index) = (pair[0], pair[1]);
        let next = usize::try_from(node_index)
            .ok()
            .filter(|i| *i < nodes.len())
            .ok_or_else(|| DriverError::protocol(format!("Path node index {} out of range", node_index)))?;
        let rel = usize::try_from(rel_index.unsigned_abs())
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| relationships.get(i))
            .ok_or_else(|| {
                DriverError::protocol(format!("Path relationship index {} out of range", rel_index))
            })?
            .clone();

        let bound = if rel_index > 0 {
            rel.bind(&nodes[prev], &nodes[next])
        } else {
            rel.bind(&nodes[next], &nodes[prev])
        };
        path_rels.push(bound);
        path_nodes.push(nodes[next].clone());
        prev = next;
    }

    Ok(Path::new(path_nodes, path_rels))
}

fn date_from_epoch_days(days: i64) -> DriverResult<NaiveDate> {
    i32::try_from(days + UNIX_EPOCH_DAYS_FROM_CE)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| DriverError::protocol(format!("Date out of range: {} days", days)))
}

fn epoch_days(date: &NaiveDate) -> i64 {
    date.num_days_from_ce() as i64 - UNIX_EPOCH_DAYS_FROM_CE
}

fn time_from_nanos(nanos: i64) -> DriverResult<NaiveTime> {
    let seconds = u32::try_from(nanos.div_euclid(NANOS_PER_SECOND)).ok();
    let fraction = nanos.rem_euclid(NANOS_PER_SECOND) as u32;
    seconds
        .and_then(|s| NaiveTime::from_num_seconds_from_midnight_opt(s, fraction))
        .ok_or_else(|| DriverError::protocol(format!("Time out of range: {} ns", nanos)))
}

fn nanos_of_day(time: &NaiveTime) -> i64 {
    time.num_seconds_from_midnight() as i64 * NANOS_PER_SECOND + time.nanosecond() as i64
}

fn utc_from_parts(seconds: i64, nanos: i64) -> DriverResult<DateTime<chrono::Utc>> {
    u32::try_from(nanos)
        .ok()
        .and_then(|n| DateTime::from_timestamp(seconds, n))
        .ok_or_else(|| DriverError::protocol(format!("Timestamp out of range: {}s {}ns", seconds, nanos)))
}

/// Sequential reader over owned structure fields.
struct Fields {
    tag: u8,
    index: usize,
    inner: std::vec::IntoIter<PackStreamValue>,
}

impl Fields {
    fn new(s: PackStreamStructure) -> Self {
        Self {
            tag: s.tag,
            index: 0,
            inner: s.fields.into_iter(),
        }
    }

    fn next(&mut self, name: &str) -> DriverResult<PackStreamValue> {
        let index = self.index;
        self.index += 1;
        self.inner.next().ok_or_else(|| {
            DriverError::protocol(format!(
                "{} is missing field {} ({})",
                structures::tag_name(self.tag),
                index,
                name
            ))
        })
    }

    fn mismatch(&self, name: &str, expected: &str, actual: &PackStreamValue) -> DriverError {
        DriverError::protocol(format!(
            "{} field {} must be {}, got {}",
            structures::tag_name(self.tag),
            name,
            expected,
            actual.type_name()
        ))
    }

    fn int(&mut self, name: &str) -> DriverResult<i64> {
        let v = self.next(name)?;
        v.as_int().ok_or_else(|| self.mismatch(name, "Integer", &v))
    }

    fn float(&mut self, name: &str) -> DriverResult<f64> {
        let v = self.next(name)?;
        v.as_float().ok_or_else(|| self.mismatch(name, "Float", &v))
    }

    fn srid(&mut self) -> DriverResult<i32> {
        i32::try_from(self.int("srid")?).map_err(|_| DriverError::protocol("SRID out of range"))
    }

    fn offset(&mut self) -> DriverResult<i32> {
        i32::try_from(self.int("tz_offset_seconds")?)
            .map_err(|_| DriverError::protocol("UTC offset out of range"))
    }

    fn string(&mut self, name: &str) -> DriverResult<String> {
        match self.next(name)? {
            PackStreamValue::String(s) => Ok(s),
            other => Err(self.mismatch(name, "String", &other)),
        }
    }

    fn string_list(&mut self, name: &str) -> DriverResult<Vec<String>> {
        let v = self.next(name)?;
        v.as_string_list().ok_or_else(|| self.mismatch(name, "List<String>", &v))
    }

    fn list(&mut self, name: &str) -> DriverResult<Vec<PackStreamValue>> {
        match self.next(name)? {
            PackStreamValue::List(l) => Ok(l),
            other => Err(self.mismatch(name, "List", &other)),
        }
    }

    fn map(&mut self, name: &str) -> DriverResult<PackStreamMap> {
        match self.next(name)? {
            PackStreamValue::Map(m) => Ok(m),
            other => Err(self.mismatch(name, "Map", &other)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
