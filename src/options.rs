/// Default number of cached pages.
pub const DEFAULT_CACHE_SIZE: usize = 1024;

/// Minimum and maximum page size accepted at database creation.
pub const MIN_PAGE_SIZE: u32 = 4096;
/// See [`MIN_PAGE_SIZE`].
pub const MAX_PAGE_SIZE: u32 = 32768;

/// Options governing how [`crate::Db::open`] behaves.
///
/// Page size is only consulted when creating a brand-new file; an existing
/// database keeps the page size recorded in its header.
#[derive(Clone, Copy, Debug)]
pub struct OpenOptions {
    pub(crate) read_only: bool,
    pub(crate) no_sync: bool,
    pub(crate) page_size: u32,
    pub(crate) cache_size: usize,
    pub(crate) create_mode: u32,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            read_only: false,
            no_sync: false,
            page_size: MIN_PAGE_SIZE,
            cache_size: DEFAULT_CACHE_SIZE,
            create_mode: 0o644,
        }
    }
}

impl OpenOptions {
    /// Start from the defaults (page size 4096, fsync on commit, read-write).
    pub fn new() -> Self {
        Self::default()
    }

    /// Open without acquiring the write lock and refuse mutation (BT_RDONLY).
    pub fn read_only(mut self, yes: bool) -> Self {
        self.read_only = yes;
        self
    }

    /// Skip `fsync` on commit (BT_NOSYNC). Faster, less durable.
    pub fn no_sync(mut self, yes: bool) -> Self {
        self.no_sync = yes;
        self
    }

    /// Page size used if the file is created fresh. Clamped to
    /// `[MIN_PAGE_SIZE, MAX_PAGE_SIZE]` and rounded up to a power of two.
    pub fn page_size(mut self, psize: u32) -> Self {
        let psize = psize.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
        self.page_size = psize.next_power_of_two();
        self
    }

    /// Initial `max_cache` for the page cache (see [`DEFAULT_CACHE_SIZE`]).
    pub fn cache_size(mut self, count: usize) -> Self {
        self.cache_size = count.max(1);
        self
    }

    /// Unix file mode used when creating the file.
    pub fn create_mode(mut self, mode: u32) -> Self {
        self.create_mode = mode;
        self
    }
}
