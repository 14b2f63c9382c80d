use crate::CollectionSource;
use crate::error::Result;
use crate::models::{Category, PageRequest, RawRecord, Status};
use async_stream::stream;
use futures::Stream;

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Page through one (uid, category, status) collection to exhaustion.
///
/// Requests start at offset 0 and advance by `page_size`, one at a time. The
/// walk ends at the first page holding fewer than `page_size` records, or once
/// the offset reaches the total the upstream reported, whichever comes first;
/// upstream totals are not trusted over the data actually received.
///
/// A failed page request is yielded once as an `Err` and ends the stream. No
/// retry is attempted.
///
/// # Examples
///
/// ```no_run
/// use futures::TryStreamExt;
/// use shelf_upstream::{Category, CollectionSource, Status, walk};
/// # async fn example(source: &dyn CollectionSource) -> shelf_upstream::error::Result<()> {
/// let records: Vec<_> = walk(source, "ahbei", Category::Book, Status::Done, 50).try_collect().await?;
/// println!("{} books read", records.len());
/// # Ok(())
/// # }
/// ```
pub fn walk<'a, S>(
    source: &'a S,
    uid: &'a str,
    category: Category,
    status: Status,
    page_size: u64,
) -> impl Stream<Item = Result<RawRecord>> + Send + 'a
where
    S: CollectionSource + ?Sized,
{
    let page_size = page_size.max(1);
    stream! {
        let mut offset = 0;
        loop {
            let request = PageRequest { uid: uid.to_string(), category, status, offset, limit: page_size };
            let page = match source.fetch_page(&request).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(uid, %category, %status, offset, "Collection page request failed");
                    yield Err(e);
                    return;
                },
            };

            let total = page.total;
            let received = page.records.len() as u64;
            for record in page.records {
                yield Ok(record);
            }

            offset += received;
            if received < page_size || offset >= total {
                tracing::debug!(uid, %category, %status, records = offset, total, "Collection walk complete");
                break;
            }
        }
    }
}
