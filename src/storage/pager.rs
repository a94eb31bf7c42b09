use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{error, info, trace};

use crate::config::{DbOptions, Synchronous};
use crate::error::{DbError, DbResult};
use crate::storage::page::{is_aligned, HeaderPage, Node, Page};
#[cfg(test)]
use crate::storage::page::PAGE_SIZE;

/// Pager: reads and writes whole 4 KiB pages of the database file and keeps
/// the header page resident. Every other page is read from disk on each visit.
pub struct Pager {
    file: File,
    header: HeaderPage,
    options: DbOptions,
    /// Page offset whose next writes fail, for exercising error paths.
    #[cfg(test)]
    fail_writes_at: Option<u64>,
}

impl Pager {
    /// Open the database file at `path`, creating and initializing it if it
    /// does not exist or is empty.
    pub fn open(path: impl AsRef<Path>, options: DbOptions) -> DbResult<Self> {
        options.validate()?;
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let file_len = file.metadata()?.len();

        if file_len == 0 {
            info!(
                "creating new database at {} (synchronous={})",
                path.display(),
                options.synchronous.as_str()
            );
            let mut pager = Pager {
                file,
                header: HeaderPage::default(),
                options,
                #[cfg(test)]
                fail_writes_at: None,
            };
            pager.sync_header()?;
            return Ok(pager);
        }

        let mut page = Page::new(0);
        file.seek(SeekFrom::Start(0))?;
        if let Err(e) = file.read_exact(&mut page.data[..]) {
            return match e.kind() {
                ErrorKind::UnexpectedEof => {
                    Err(DbError::Corrupt("file shorter than one page".into()))
                }
                _ => Err(DbError::Io(e)),
            };
        }
        let header = HeaderPage::decode(&page)?;
        if file_len < header.file_end() {
            return Err(DbError::Corrupt(format!(
                "file holds {} bytes but the header reports {} pages",
                file_len, header.page_count
            )));
        }

        info!(
            "opened database at {} ({} pages, root at {}, synchronous={})",
            path.display(),
            header.page_count,
            header.root_page_offset,
            options.synchronous.as_str()
        );
        Ok(Pager {
            file,
            header,
            options,
            #[cfg(test)]
            fail_writes_at: None,
        })
    }

    pub fn header(&self) -> &HeaderPage {
        &self.header
    }

    pub(crate) fn header_mut(&mut self) -> &mut HeaderPage {
        &mut self.header
    }

    pub fn options(&self) -> &DbOptions {
        &self.options
    }

    pub fn root_offset(&self) -> u64 {
        self.header.root_page_offset
    }

    /// Point the header at a new root (0 for an empty tree) and persist it.
    pub fn set_root(&mut self, offset: u64) -> DbResult<()> {
        let previous = self.header.root_page_offset;
        self.header.root_page_offset = offset;
        if let Err(e) = self.sync_header() {
            self.header.root_page_offset = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Write the resident header back to page 0.
    pub(crate) fn sync_header(&mut self) -> DbResult<()> {
        let page = self.header.encode();
        self.write_page(&page)
    }

    /// Read the page at `offset`, which must be page-aligned.
    pub fn read_page(&mut self, offset: u64) -> DbResult<Page> {
        if !is_aligned(offset) {
            return Err(DbError::MisalignedOffset(offset));
        }
        trace!("read page {}", offset);

        let mut page = Page::new(offset);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut page.data[..])?;
        Ok(page)
    }

    /// Write `page` back to its offset, then flush according to [`Synchronous`].
    pub fn write_page(&mut self, page: &Page) -> DbResult<()> {
        if !is_aligned(page.offset) {
            return Err(DbError::MisalignedOffset(page.offset));
        }
        if page.offset >= self.header.file_end() {
            return Err(DbError::OffsetOutOfRange {
                offset: page.offset,
                page_count: self.header.page_count,
            });
        }
        #[cfg(test)]
        {
            if self.fail_writes_at == Some(page.offset) {
                return Err(DbError::Io(std::io::Error::other("injected write failure")));
            }
        }
        trace!("write page {}", page.offset);

        self.file.seek(SeekFrom::Start(page.offset))?;
        self.file.write_all(&page.data[..])?;
        self.file.flush()?;
        if self.options.synchronous == Synchronous::Full {
            self.file.sync_data()?;
        }
        Ok(())
    }

    pub fn read_node(&mut self, offset: u64) -> DbResult<Node> {
        let page = self.read_page(offset)?;
        Node::decode(&page)
    }

    #[cfg(test)]
    pub(crate) fn write_node(&mut self, offset: u64, node: &Node) -> DbResult<()> {
        self.write_page(&node.encode(offset))
    }

    /// Force everything written so far to stable storage.
    pub fn sync_all(&mut self) -> DbResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Current length of the underlying file in pages.
    #[cfg(test)]
    pub(crate) fn file_length_pages(&self) -> DbResult<u64> {
        Ok(self.file.metadata()?.len() / PAGE_SIZE as u64)
    }

    /// Make every later write to `offset` fail until cleared with `None`.
    #[cfg(test)]
    pub(crate) fn fail_writes_at(&mut self, offset: Option<u64>) {
        self.fail_writes_at = offset;
    }
}

impl Drop for Pager {
    fn drop(&mut self) {
        if let Err(e) = self.file.sync_all() {
            error!("failed to sync database file while dropping Pager: {e}");
        }
    }
}
