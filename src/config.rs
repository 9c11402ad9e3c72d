//! Configuration system for memory, cache, and simulation settings.
//!
//! Loads and parses TOML configuration files to customize the simulated
//! hardware: main-memory timing, local memory, and the three caches.

use serde::Deserialize;

const DEFAULT_MEMORY_SIZE: usize = 0x0400_0000;
const DEFAULT_LOCAL_SIZE: usize = 0x800;

const DEFAULT_BYTES_PER_BURST: u32 = 8;
const DEFAULT_TICKS_PER_BURST: u32 = 1;
const DEFAULT_READ_DELAY: u32 = 0;
const DEFAULT_BYTES_PER_PAGE: u32 = 1024;

const DEFAULT_MCACHE_SIZE: u32 = 0x800;
const DEFAULT_MCACHE_BLOCK: u32 = 32;
const DEFAULT_MCACHE_INIT_BLOCKS: u32 = 4;

const DEFAULT_SCACHE_SIZE: u32 = 0x800;
const DEFAULT_SCACHE_BLOCK: u32 = 4;
const DEFAULT_SCACHE_TOTAL: u32 = 0x1_0000;

const DEFAULT_DCACHE_SIZE: u32 = 0x800;
const DEFAULT_DCACHE_LINE: u32 = 32;
const DEFAULT_DCACHE_WAYS: usize = 2;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub local_memory: LocalMemoryConfig,
    #[serde(default)]
    pub method_cache: MethodCacheConfig,
    #[serde(default)]
    pub stack_cache: StackCacheConfig,
    #[serde(default)]
    pub data_cache: DataCacheConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    /// Print the retiring bundle every cycle.
    #[serde(default)]
    pub trace_instructions: bool,

    /// Hard cap on simulated cycles.
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            trace_instructions: false,
            max_cycles: default_max_cycles(),
        }
    }
}

/// Main-memory timing model selection.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemoryModel {
    /// No timing; every access completes immediately.
    Ideal,
    /// Fixed cost per burst.
    #[default]
    Fixed,
    /// Page-crossing overhead plus per-word streaming.
    Variable,
    /// Time-division multiplexed arbitration between cores.
    Tdm,
}

#[derive(Debug, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_size")]
    pub size: usize,

    #[serde(default)]
    pub model: MemoryModel,

    #[serde(default = "default_bytes_per_burst")]
    pub bytes_per_burst: u32,

    #[serde(default = "default_ticks_per_burst")]
    pub ticks_per_burst: u32,

    #[serde(default = "default_read_delay")]
    pub read_delay: u32,

    /// Posted-write capacity; 0 disables posting.
    #[serde(default)]
    pub posted_writes: usize,

    /// Page size of the variable-burst model.
    #[serde(default = "default_bytes_per_page")]
    pub bytes_per_page: u32,

    /// Number of cores sharing the TDM round.
    #[serde(default = "default_cores")]
    pub cores: u32,

    /// This core's TDM slot index.
    #[serde(default)]
    pub cpu_id: u32,

    /// Refresh ticks appended to every TDM round.
    #[serde(default)]
    pub refresh_ticks: u32,

    /// Fail reads of never-written bytes.
    #[serde(default)]
    pub strict_init_check: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            size: default_memory_size(),
            model: MemoryModel::default(),
            bytes_per_burst: default_bytes_per_burst(),
            ticks_per_burst: default_ticks_per_burst(),
            read_delay: default_read_delay(),
            posted_writes: 0,
            bytes_per_page: default_bytes_per_page(),
            cores: default_cores(),
            cpu_id: 0,
            refresh_ticks: 0,
            strict_init_check: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LocalMemoryConfig {
    #[serde(default = "default_local_size")]
    pub size: usize,
}

impl Default for LocalMemoryConfig {
    fn default() -> Self {
        Self {
            size: default_local_size(),
        }
    }
}

/// Method cache organization.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MethodCacheKind {
    /// Every method is always resident.
    Ideal,
    /// LRU replacement over whole methods.
    #[default]
    Lru,
    /// FIFO replacement over whole methods.
    Fifo,
}

#[derive(Debug, Deserialize)]
pub struct MethodCacheConfig {
    #[serde(default)]
    pub kind: MethodCacheKind,

    #[serde(default = "default_mcache_size")]
    pub size: u32,

    #[serde(default = "default_mcache_block")]
    pub block_bytes: u32,

    /// Blocks preloaded for the entry method.
    #[serde(default = "default_mcache_init_blocks")]
    pub init_blocks: u32,
}

impl Default for MethodCacheConfig {
    fn default() -> Self {
        Self {
            kind: MethodCacheKind::default(),
            size: default_mcache_size(),
            block_bytes: default_mcache_block(),
            init_blocks: default_mcache_init_blocks(),
        }
    }
}

/// Stack cache organization.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StackCacheKind {
    /// Unbounded, no spill or fill.
    Ideal,
    /// Block-organized with automatic spill and fill.
    #[default]
    Block,
}

#[derive(Debug, Deserialize)]
pub struct StackCacheConfig {
    #[serde(default)]
    pub kind: StackCacheKind,

    #[serde(default = "default_scache_size")]
    pub size: u32,

    #[serde(default = "default_scache_block")]
    pub block_bytes: u32,

    /// Bound on resident plus spilled bytes.
    #[serde(default = "default_scache_total")]
    pub total_size: u32,
}

impl Default for StackCacheConfig {
    fn default() -> Self {
        Self {
            kind: StackCacheKind::default(),
            size: default_scache_size(),
            block_bytes: default_scache_block(),
            total_size: default_scache_total(),
        }
    }
}

/// Data cache organization.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DataCacheKind {
    /// Always hits, no timing.
    #[default]
    Ideal,
    /// No cache; full memory timing on every access.
    None,
    /// Set-associative write-through LRU.
    Lru,
}

#[derive(Debug, Deserialize)]
pub struct DataCacheConfig {
    #[serde(default)]
    pub kind: DataCacheKind,

    #[serde(default = "default_dcache_size")]
    pub size: u32,

    #[serde(default = "default_dcache_line")]
    pub line_bytes: u32,

    #[serde(default = "default_dcache_ways")]
    pub ways: usize,
}

impl Default for DataCacheConfig {
    fn default() -> Self {
        Self {
            kind: DataCacheKind::default(),
            size: default_dcache_size(),
            line_bytes: default_dcache_line(),
            ways: default_dcache_ways(),
        }
    }
}

fn default_max_cycles() -> u64 {
    u64::MAX
}

fn default_memory_size() -> usize {
    DEFAULT_MEMORY_SIZE
}

fn default_local_size() -> usize {
    DEFAULT_LOCAL_SIZE
}

fn default_bytes_per_burst() -> u32 {
    DEFAULT_BYTES_PER_BURST
}

fn default_ticks_per_burst() -> u32 {
    DEFAULT_TICKS_PER_BURST
}

fn default_read_delay() -> u32 {
    DEFAULT_READ_DELAY
}

fn default_bytes_per_page() -> u32 {
    DEFAULT_BYTES_PER_PAGE
}

fn default_cores() -> u32 {
    1
}

fn default_mcache_size() -> u32 {
    DEFAULT_MCACHE_SIZE
}

fn default_mcache_block() -> u32 {
    DEFAULT_MCACHE_BLOCK
}

fn default_mcache_init_blocks() -> u32 {
    DEFAULT_MCACHE_INIT_BLOCKS
}

fn default_scache_size() -> u32 {
    DEFAULT_SCACHE_SIZE
}

fn default_scache_block() -> u32 {
    DEFAULT_SCACHE_BLOCK
}

fn default_scache_total() -> u32 {
    DEFAULT_SCACHE_TOTAL
}

fn default_dcache_size() -> u32 {
    DEFAULT_DCACHE_SIZE
}

fn default_dcache_line() -> u32 {
    DEFAULT_DCACHE_LINE
}

fn default_dcache_ways() -> usize {
    DEFAULT_DCACHE_WAYS
}
