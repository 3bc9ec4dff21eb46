//! Checked byte heap.
//!
//! Every allocation is a separate block addressed by id, so out-of-bounds
//! accesses, use after free and double frees are detected instead of
//! corrupting neighbouring data. Stack slots of active calls live in the
//! same heap as `Stack` blocks and are not counted as live allocations.

use rustc_hash::FxHashMap;
use tessel_native::NativeType;

use crate::error::{fault, ExecResult};
use crate::value::{round_float, wrap, Address, Value};

/// Highest allocation id; ids above are dynamic object handles.
pub(crate) const MAX_BLOCK_ID: u32 = 0x7fff_ffff;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum BlockKind {
    Heap,
    Stack,
}

struct Block {
    bytes: Vec<u8>,
    kind: BlockKind,
}

/// Allocation counters. Only heap blocks are counted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub allocations: u64,
    pub frees: u64,
    pub reallocations: u64,
    /// Heap blocks currently allocated.
    pub live: usize,
    /// Bytes held by live heap blocks.
    pub live_bytes: usize,
}

#[derive(Default)]
pub struct Heap {
    blocks: FxHashMap<u32, Block>,
    next_id: u32,
    stats: HeapStats,
}

pub(crate) fn block_of(addr: Address) -> u32 {
    (addr >> 32) as u32
}

pub(crate) fn offset_of(addr: Address) -> u32 {
    addr as u32
}

pub(crate) fn address(block: u32, offset: u32) -> Address {
    (u64::from(block) << 32) | u64::from(offset)
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    /// Number of heap blocks currently allocated.
    pub fn live(&self) -> usize {
        self.stats.live
    }

    fn fresh_id(&mut self) -> ExecResult<u32> {
        self.next_id += 1;
        if self.next_id > MAX_BLOCK_ID {
            return Err(fault("address space exhausted"));
        }
        Ok(self.next_id)
    }

    fn insert(&mut self, size: usize, kind: BlockKind) -> ExecResult<Address> {
        let id = self.fresh_id()?;
        self.blocks.insert(
            id,
            Block {
                bytes: vec![0; size],
                kind,
            },
        );
        if kind == BlockKind::Heap {
            self.stats.allocations += 1;
            self.stats.live += 1;
            self.stats.live_bytes += size;
        }
        Ok(address(id, 0))
    }

    /// A zeroed heap block of `size` bytes. Zero-sized blocks are valid
    /// and distinct.
    pub fn malloc(&mut self, size: i64) -> ExecResult<Address> {
        let Ok(size) = usize::try_from(size) else {
            return Err(fault(format!("malloc of negative size {size}")));
        };
        self.insert(size, BlockKind::Heap)
    }

    /// Move the block at `addr` to a new block of `size` bytes. A null
    /// `addr` allocates.
    pub fn realloc(&mut self, addr: Address, size: i64) -> ExecResult<Address> {
        if addr == 0 {
            return self.malloc(size);
        }
        let Ok(size) = usize::try_from(size) else {
            return Err(fault(format!("realloc to negative size {size}")));
        };
        let mut bytes = self.take_heap_block(addr, "realloc")?;
        let old_size = bytes.len();
        bytes.resize(size, 0);
        let id = self.fresh_id()?;
        self.blocks.insert(
            id,
            Block {
                bytes,
                kind: BlockKind::Heap,
            },
        );
        self.stats.reallocations += 1;
        self.stats.live_bytes = self.stats.live_bytes - old_size + size;
        Ok(address(id, 0))
    }

    /// Release a heap block. Freeing null does nothing.
    pub fn free(&mut self, addr: Address) -> ExecResult<()> {
        if addr == 0 {
            return Ok(());
        }
        let bytes = self.take_heap_block(addr, "free")?;
        self.stats.frees += 1;
        self.stats.live -= 1;
        self.stats.live_bytes -= bytes.len();
        Ok(())
    }

    fn take_heap_block(&mut self, addr: Address, what: &str) -> ExecResult<Vec<u8>> {
        if offset_of(addr) != 0 {
            return Err(fault(format!("{what} of interior pointer {addr:#x}")));
        }
        let id = block_of(addr);
        match self.blocks.get(&id) {
            None => return Err(fault(format!("{what} of unallocated pointer {addr:#x}"))),
            Some(block) if block.kind == BlockKind::Stack => {
                return Err(fault(format!("{what} of stack slot {addr:#x}")));
            }
            Some(_) => {}
        }
        Ok(self.blocks.remove(&id).map(|b| b.bytes).unwrap_or_default())
    }

    pub(crate) fn push_stack(&mut self, size: u32) -> ExecResult<Address> {
        self.insert(size as usize, BlockKind::Stack)
    }

    pub(crate) fn pop_stack(&mut self, addr: Address) {
        self.blocks.remove(&block_of(addr));
    }

    fn range(&self, addr: Address, len: usize) -> ExecResult<(&Block, usize)> {
        let block = self
            .blocks
            .get(&block_of(addr))
            .ok_or_else(|| fault(format!("access to unallocated address {addr:#x}")))?;
        let start = offset_of(addr) as usize;
        if start + len > block.bytes.len() {
            return Err(fault(format!(
                "access of {len} bytes at {addr:#x} overruns a block of {} bytes",
                block.bytes.len()
            )));
        }
        Ok((block, start))
    }

    pub fn read_bytes(&self, addr: Address, len: usize) -> ExecResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let (block, start) = self.range(addr, len)?;
        Ok(block.bytes[start..start + len].to_vec())
    }

    pub fn write_bytes(&mut self, addr: Address, bytes: &[u8]) -> ExecResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let (_, start) = self.range(addr, bytes.len())?;
        if let Some(block) = self.blocks.get_mut(&block_of(addr)) {
            block.bytes[start..start + bytes.len()].copy_from_slice(bytes);
        }
        Ok(())
    }

    /// `memmove`: the ranges may overlap.
    pub fn mem_move(&mut self, dst: Address, src: Address, len: i64) -> ExecResult<()> {
        let Ok(len) = usize::try_from(len) else {
            return Err(fault(format!("memmove of negative length {len}")));
        };
        let bytes = self.read_bytes(src, len)?;
        self.write_bytes(dst, &bytes)
    }

    /// Load a scalar of type `ty`.
    pub fn load(&self, addr: Address, ty: &NativeType) -> ExecResult<Value> {
        match ty {
            NativeType::Void => Ok(Value::Void),
            NativeType::Int { bits, signed } => {
                let bytes = self.read_bytes(addr, ty.size() as usize)?;
                let mut raw = [0u8; 16];
                raw[..bytes.len()].copy_from_slice(&bytes);
                let unsigned = i128::from_le_bytes(raw);
                Ok(Value::Int {
                    value: wrap(unsigned, *bits, *signed),
                    bits: *bits,
                    signed: *signed,
                })
            }
            NativeType::Float { bits: 32 } => {
                let bytes = self.read_bytes(addr, 4)?;
                let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
                Ok(Value::Float {
                    value: f64::from(f32::from_le_bytes(raw)),
                    bits: 32,
                })
            }
            NativeType::Float { bits } => {
                let bytes = self.read_bytes(addr, 8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes);
                Ok(Value::Float {
                    value: round_float(f64::from_le_bytes(raw), *bits),
                    bits: *bits,
                })
            }
            NativeType::Pointer => {
                let bytes = self.read_bytes(addr, 8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes);
                Ok(Value::Ptr(u64::from_le_bytes(raw)))
            }
            NativeType::Struct(_) | NativeType::Array { .. } => {
                Err(fault(format!("scalar load of aggregate type {ty}")))
            }
        }
    }

    /// Store `value` converted to type `ty`.
    pub fn store(&mut self, addr: Address, value: Value, ty: &NativeType) -> ExecResult<()> {
        match (ty, value.convert(ty)) {
            (NativeType::Void, _) => Ok(()),
            (NativeType::Int { .. }, Value::Int { value, .. }) => {
                let size = ty.size() as usize;
                let bytes = value.to_le_bytes();
                self.write_bytes(addr, &bytes[..size])
            }
            (NativeType::Float { bits: 32 }, Value::Float { value, .. }) => {
                self.write_bytes(addr, &(value as f32).to_le_bytes())
            }
            (NativeType::Float { .. }, Value::Float { value, .. }) => {
                self.write_bytes(addr, &value.to_le_bytes())
            }
            (NativeType::Pointer, Value::Ptr(ptr)) => self.write_bytes(addr, &ptr.to_le_bytes()),
            (ty, value) => Err(fault(format!("can't store {value} as {ty}"))),
        }
    }
}
