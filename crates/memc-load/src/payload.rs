//! Wire payload stored under each device key
//!
//! Protobuf (proto2) layout:
//!
//! ```text
//! message UserApps {
//!     repeated uint32 apps = 1;
//!     optional double lat = 2;
//!     optional double lon = 3;
//! }
//! ```

use memc_common::Result;
use prost::Message;

use crate::record::AppsInstalled;

#[derive(Clone, PartialEq, prost::Message)]
pub struct UserApps {
    #[prost(uint32, repeated, packed = "false", tag = "1")]
    pub apps: Vec<u32>,
    #[prost(double, optional, tag = "2")]
    pub lat: Option<f64>,
    #[prost(double, optional, tag = "3")]
    pub lon: Option<f64>,
}

impl From<&AppsInstalled> for UserApps {
    fn from(record: &AppsInstalled) -> Self {
        Self {
            apps: record.apps.clone(),
            lat: record.lat,
            lon: record.lon,
        }
    }
}

impl UserApps {
    /// Serialize to the bytes written to the store
    pub fn pack(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Deserialize bytes previously produced by [`UserApps::pack`]
    pub fn unpack(bytes: &[u8]) -> Result<Self> {
        Ok(Self::decode(bytes)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::record::parse_appsinstalled;

    #[test]
    fn test_pack_unpack_preserves_record() {
        let record = parse_appsinstalled("gaid\t7rfw452y52g2gq4g\t55.55\t42.42\t7423,424,424").unwrap();
        let payload = UserApps::from(&record);

        let unpacked = UserApps::unpack(&payload.pack()).unwrap();
        assert_eq!(unpacked, payload);
        assert_eq!(unpacked.apps, vec![7423, 424, 424]);
        assert_eq!(unpacked.lat, Some(55.55));
    }

    #[test]
    fn test_missing_coordinate_is_not_encoded() {
        let record = parse_appsinstalled("idfa\tabc\tbad\t1.5\t1").unwrap();
        let unpacked = UserApps::unpack(&UserApps::from(&record).pack()).unwrap();

        assert_eq!(unpacked.lat, None);
        assert_eq!(unpacked.lon, Some(1.5));
    }

    #[test]
    fn test_apps_use_unpacked_encoding() {
        let payload = UserApps {
            apps: vec![1, 2],
            lat: None,
            lon: None,
        };
        // field 1, wire type varint, once per element
        assert_eq!(payload.pack(), vec![0x08, 0x01, 0x08, 0x02]);
    }

    #[test]
    fn test_unpack_rejects_garbage() {
        assert!(UserApps::unpack(&[0xff, 0xff, 0xff]).is_err());
    }
}
