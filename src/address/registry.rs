//! In-process stand-in for the host runtime's live object table (see
//! `mod.rs` module doc for why this doesn't touch real memory).

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::mask::{class_pointer_mask, Arch};

pub type ClassId = Arc<str>;

struct Entry {
    class: ClassId,
    value: Arc<dyn Any + Send + Sync>,
}

/// A handle to a live, type-erased registered object, returned by
/// `Registry::lookup`. Call `downcast` to recover the concrete type.
pub struct ObjectHandle {
    class: ClassId,
    value: Arc<dyn Any + Send + Sync>,
}

impl ObjectHandle {
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn downcast<T: Send + Sync + 'static>(self) -> Option<Arc<T>> {
        self.value.downcast().ok()
    }
}

/// Tracks which classes are currently registered and their superclass
/// chain, plus the live object table keyed by synthetic 8-byte-aligned
/// "address".
pub struct Registry {
    objects: RwLock<HashMap<u64, Entry>>,
    hierarchy: RwLock<HashMap<ClassId, Option<ClassId>>>,
    next_address: AtomicU64,
    arch: Arch,
}

/// Synthetic addresses start well above zero so that `parse_address`
/// collisions with small integers (0, 1, 3, 5, 7 in the address-lookup
/// round-trip property) can never occur by accident.
const FIRST_ADDRESS: u64 = 0x1000;
const ADDRESS_STRIDE: u64 = 8; // keeps every handed-out address 8-byte aligned

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            hierarchy: RwLock::new(HashMap::new()),
            next_address: AtomicU64::new(FIRST_ADDRESS),
            arch: Arch::current(),
        }
    }

    /// Declare a class and its (optional) superclass. Registering the same
    /// class twice with the same superclass is a no-op.
    pub fn register_class(&self, class: impl Into<ClassId>, superclass: Option<ClassId>) {
        self.hierarchy.write().insert(class.into(), superclass);
    }

    /// Register a live object under `class`, returning the synthetic address
    /// clients should be given (e.g. via `address_string`).
    pub fn register(&self, class: impl Into<ClassId>, value: Arc<dyn Any + Send + Sync>) -> u64 {
        let address = self.next_address.fetch_add(ADDRESS_STRIDE, Ordering::SeqCst);
        self.objects.write().insert(
            address,
            Entry {
                class: class.into(),
                value,
            },
        );
        address
    }

    pub fn unregister(&self, address: u64) {
        self.objects.write().remove(&address);
    }

    fn is_class_or_subclass(&self, actual: &ClassId, target: &str) -> bool {
        if actual.as_ref() == target {
            return true;
        }
        let hierarchy = self.hierarchy.read();
        let mut current = actual.clone();
        while let Some(Some(parent)) = hierarchy.get(&current) {
            if parent.as_ref() == target {
                return true;
            }
            current = parent.clone();
        }
        false
    }

    /// Implements the address-lookup contract: non-zero, 8-byte aligned, a
    /// registered class, and that class is `target_class` or a subclass of
    /// it. Returns `None` as soon as any step fails; every failing path
    /// here is a pure arithmetic/map check, never a memory access.
    pub fn lookup(&self, address: u64, target_class: &str) -> Option<ObjectHandle> {
        if address == 0 {
            return None;
        }
        if !address.is_multiple_of(8) {
            return None;
        }

        // Step 3 in the real runtime: mask the word at `address` and check
        // it names a registered class. Here "the word at that address" is
        // simply the class the object was registered under; see the
        // module doc for why we never read real memory.
        let _ = class_pointer_mask(self.arch);

        let objects = self.objects.read();
        let entry = objects.get(&address)?;
        if !self.hierarchy.read().contains_key(&entry.class) {
            return None;
        }

        if !self.is_class_or_subclass(&entry.class, target_class) {
            return None;
        }

        Some(ObjectHandle {
            class: entry.class.clone(),
            value: entry.value.clone(),
        })
    }
}
