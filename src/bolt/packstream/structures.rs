//! Structure tags for graph, temporal and spatial values.
//!
//! The field layout of a few structures changed when element ids were
//! introduced, so [`field_count`] needs to know whether the negotiated
//! version carries them.

/// Node: id, labels, properties [, element_id]
pub const NODE: u8 = 0x4E;
/// Relationship: id, start, end, type, properties [, element_id, start_element_id, end_element_id]
pub const RELATIONSHIP: u8 = 0x52;
/// Relationship inside a path: id, type, properties [, element_id]
pub const UNBOUND_RELATIONSHIP: u8 = 0x72;
/// Path: nodes, relationships, indices
pub const PATH: u8 = 0x50;

/// Point2D: srid, x, y
pub const POINT_2D: u8 = 0x58;
/// Point3D: srid, x, y, z
pub const POINT_3D: u8 = 0x59;

/// Date: days since the Unix epoch
pub const DATE: u8 = 0x44;
/// Time: nanoseconds since midnight, offset seconds
pub const TIME: u8 = 0x54;
/// LocalTime: nanoseconds since midnight
pub const LOCAL_TIME: u8 = 0x74;
/// LocalDateTime: seconds, nanoseconds
pub const LOCAL_DATE_TIME: u8 = 0x64;
/// DateTime with offset, seconds counted in local time
pub const DATE_TIME_OFFSET_LEGACY: u8 = 0x46;
/// DateTime with zone id, seconds counted in local time
pub const DATE_TIME_ZONE_ID_LEGACY: u8 = 0x66;
/// DateTime with offset, seconds counted in UTC
pub const DATE_TIME_OFFSET: u8 = 0x49;
/// DateTime with zone id, seconds counted in UTC
pub const DATE_TIME_ZONE_ID: u8 = 0x69;
/// Duration: months, days, seconds, nanoseconds
pub const DURATION: u8 = 0x45;

/// Number of fields a value structure must carry, or `None` for tags that
/// are not value structures.
pub fn field_count(tag: u8, element_ids: bool) -> Option<usize> {
    let count = match tag {
        NODE => if element_ids { 4 } else { 3 },
        RELATIONSHIP => if element_ids { 8 } else { 5 },
        UNBOUND_RELATIONSHIP => if element_ids { 4 } else { 3 },
        PATH => 3,
        POINT_2D => 3,
        POINT_3D => 4,
        DATE => 1,
        TIME => 2,
        LOCAL_TIME => 1,
        LOCAL_DATE_TIME => 2,
        DATE_TIME_OFFSET_LEGACY
        | DATE_TIME_ZONE_ID_LEGACY
        | DATE_TIME_OFFSET
        | DATE_TIME_ZONE_ID => 3,
        DURATION => 4,
        _ => return None,
    };
    Some(count)
}

/// Human readable name of a value structure tag.
pub fn tag_name(tag: u8) -> &'static str {
    match tag {
        NODE => "Node",
        RELATIONSHIP => "Relationship",
        UNBOUND_RELATIONSHIP => "UnboundRelationship",
        PATH => "Path",
        POINT_2D => "Point2D",
        POINT_3D => "Point3D",
        DATE => "Date",
        TIME => "Time",
        LOCAL_TIME => "LocalTime",
        LOCAL_DATE_TIME => "LocalDateTime",
        DATE_TIME_OFFSET_LEGACY | DATE_TIME_OFFSET => "DateTime",
        DATE_TIME_ZONE_ID_LEGACY | DATE_TIME_ZONE_ID => "DateTimeZoneId",
        DURATION => "Duration",
        _ => "Structure",
    }
}
