use bytes::{Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::api::resource_dto::ResourceCollectionDto;

/// Length-delimited TCP framing around bincode-encoded sample batches.
pub struct ResourceCodec {
    codec: LengthDelimitedCodec,
}

impl ResourceCodec {
    pub fn new() -> Self {
        Self { codec: LengthDelimitedCodec::new() }
    }
}

impl Default for ResourceCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<ResourceCollectionDto> for ResourceCodec {
    type Error = io::Error;

    fn encode(&mut self, item: ResourceCollectionDto, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = bincode::serialize(&item).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.codec.encode(Bytes::from(bytes), dst)
    }
}

impl Decoder for ResourceCodec {
    type Item = ResourceCollectionDto;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.codec.decode(src)? {
            Some(bytes) => {
                let item = bincode::deserialize(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trace::{ResourceSample, Snapshot};
    use std::collections::BTreeMap;

    fn batch() -> ResourceCollectionDto {
        let mut readings = BTreeMap::new();
        readings.insert("load_average".to_string(), Some(Snapshot::default().with_metric("load1", 0.5)));
        readings.insert("energy".to_string(), None);
        ResourceCollectionDto::new(vec![ResourceSample { source: "exec-1".to_string(), timestamp: 42, readings }])
    }

    #[test]
    fn decodes_frames_split_across_reads() {
        let mut codec = ResourceCodec::new();
        let mut wire = BytesMut::new();
        codec.encode(batch(), &mut wire).unwrap();
        codec.encode(ResourceCollectionDto::default(), &mut wire).unwrap();

        let mut partial = wire.split_to(3);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        partial.unsplit(wire);

        assert_eq!(codec.decode(&mut partial).unwrap(), Some(batch()));
        assert_eq!(codec.decode(&mut partial).unwrap(), Some(ResourceCollectionDto::default()));
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn garbage_payload_is_invalid_data() {
        let mut framing = LengthDelimitedCodec::new();
        let mut wire = BytesMut::new();
        framing.encode(Bytes::from_static(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]), &mut wire).unwrap();

        let err = ResourceCodec::new().decode(&mut wire).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
