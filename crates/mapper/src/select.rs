use crate::MapperHandle;
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use recon_model::SourceItem;
use recon_source::Source;
use tracing::instrument;

/// The first candidate, in order, whose [`check`](crate::Mapper::check)
/// accepts `item`.
pub fn select_for<'a>(candidates: &'a [MapperHandle], item: &SourceItem) -> Option<&'a MapperHandle> {
    candidates.iter().enumerate().find_map(|(position, mapper)| {
        let compatible = mapper.check(item);
        tracing::debug!(position, compatible, "Checked mapper candidate");
        compatible.then_some(mapper)
    })
}

/// Pick the mapper for a source by trying candidates, in order, with the
/// source's first item.
#[instrument(skip_all, fields(candidates = candidates.len()))]
pub async fn select<S>(candidates: &[MapperHandle], source: &S) -> Result<MapperHandle>
where
    S: Source + ?Sized,
{
    let item = source
        .first()
        .await
        .or_raise(|| ErrorKind::Source)?
        .ok_or_raise(|| ErrorKind::EmptySource)?;
    select_for(candidates, &item)
        .cloned()
        .ok_or_raise(|| ErrorKind::NoCompatibleMapper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Mapper, SchemaMapper};
    use recon_model::{FieldKind, Schema};
    use recon_source::IterableSource;
    use std::sync::Arc;

    fn mapper(key: &str, other: &str) -> MapperHandle {
        let schema = Schema::builder(format!("{key}-{other}"), key)
            .field(key, FieldKind::Text)
            .field(other, FieldKind::Text)
            .build()
            .unwrap();
        Arc::new(SchemaMapper::identity(Arc::new(schema)))
    }

    fn source() -> IterableSource {
        IterableSource::new([SourceItem::new("id", [("id", "1"), ("name", "Pooh")])]).unwrap()
    }

    #[tokio::test]
    async fn test_first_compatible_wins() {
        let candidates = [mapper("id", "colour"), mapper("id", "name"), mapper("name", "id")];
        let selected = select(&candidates, &source()).await.unwrap();
        assert!(Arc::ptr_eq(&selected, &candidates[1]));
        assert_eq!(selected.key(), "id");
    }

    #[tokio::test]
    async fn test_no_compatible_mapper() {
        let candidates = [mapper("id", "colour")];
        let err = select(&candidates, &source()).await.err().expect("expected an error");
        assert_eq!(*err, ErrorKind::NoCompatibleMapper);
    }

    #[tokio::test]
    async fn test_empty_source() {
        let candidates = [mapper("id", "name")];
        let err = select(&candidates, &IterableSource::empty("id")).await.err().expect("expected an error");
        assert_eq!(*err, ErrorKind::EmptySource);
    }
}
