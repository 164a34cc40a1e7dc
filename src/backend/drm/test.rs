#![allow(missing_docs)]
//! A [`KmsDevice`] without hardware, recording every request

use std::cell::{Cell, RefCell};
use std::fmt;
use std::io;

use super::{FbHandle, KmsDevice, PendingState, PlaneHandle};
use crate::backend::allocator::dmabuf::Dmabuf;
use crate::utils::{Physical, Size};

type RejectFn = Box<dyn Fn(&PendingState) -> bool>;

pub struct TestDevice {
    device_id: u64,
    import_path: Cell<bool>,
    fail_imports: Cell<bool>,
    kernel_checks: Cell<bool>,
    reject: RefCell<Option<RejectFn>>,
    next_fb: Cell<u32>,
    tests: Cell<usize>,
    commits: Cell<usize>,
    imports: Cell<usize>,
    cursor_writes: RefCell<Vec<FbHandle>>,
    removed: RefCell<Vec<FbHandle>>,
}

impl fmt::Debug for TestDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDevice")
            .field("device_id", &self.device_id)
            .field("tests", &self.tests.get())
            .field("commits", &self.commits.get())
            .field("imports", &self.imports.get())
            .field("cursor_writes", &self.cursor_writes.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Default for TestDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl TestDevice {
    pub fn new() -> TestDevice {
        TestDevice {
            device_id: 0xe280,
            import_path: Cell::new(true),
            fail_imports: Cell::new(false),
            kernel_checks: Cell::new(true),
            reject: RefCell::new(None),
            next_fb: Cell::new(1),
            tests: Cell::new(0),
            commits: Cell::new(0),
            imports: Cell::new(0),
            cursor_writes: RefCell::new(Vec::new()),
            removed: RefCell::new(Vec::new()),
        }
    }

    pub fn set_import_path(&self, available: bool) {
        self.import_path.set(available);
    }

    pub fn set_fail_imports(&self, fail: bool) {
        self.fail_imports.set(fail);
    }

    /// Toggle the zpos and crtc checks every kernel does
    ///
    /// Without them the device accepts states a real kernel would refuse.
    pub fn set_kernel_checks(&self, enabled: bool) {
        self.kernel_checks.set(enabled);
    }

    /// Reject every test and commit for which `reject` returns true
    pub fn reject_when(&self, reject: impl Fn(&PendingState) -> bool + 'static) {
        *self.reject.borrow_mut() = Some(Box::new(reject));
    }

    pub fn accept_all(&self) {
        *self.reject.borrow_mut() = None;
    }

    pub fn test_count(&self) -> usize {
        self.tests.get()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.get()
    }

    pub fn import_count(&self) -> usize {
        self.imports.get()
    }

    pub fn cursor_write_count(&self) -> usize {
        self.cursor_writes.borrow().len()
    }

    /// Cursor buffers written to, oldest first
    pub fn cursor_writes(&self) -> Vec<FbHandle> {
        self.cursor_writes.borrow().clone()
    }

    pub fn removed_framebuffers(&self) -> Vec<FbHandle> {
        self.removed.borrow().clone()
    }

    fn next_handle(&self) -> FbHandle {
        let handle = self.next_fb.get();
        self.next_fb.set(handle + 1);
        FbHandle(handle)
    }

    /// The checks a kernel would do regardless of hardware limits
    fn validate(&self, state: &PendingState) -> io::Result<()> {
        let mut enabled = Vec::<PlaneHandle>::new();
        for output in state.iter().filter(|_| self.kernel_checks.get()) {
            if !output.check_zpos() {
                return Err(io::Error::new(io::ErrorKind::InvalidInput, "duplicate zpos"));
            }
            for ps in output.enabled() {
                if enabled.contains(&ps.plane) {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "plane enabled on multiple crtcs",
                    ));
                }
                enabled.push(ps.plane);
            }
        }

        if self.reject.borrow().as_ref().is_some_and(|reject| reject(state)) {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "rejected by test device"));
        }
        Ok(())
    }
}

impl KmsDevice for TestDevice {
    fn device_id(&self) -> u64 {
        self.device_id
    }

    fn has_import_path(&self) -> bool {
        self.import_path.get()
    }

    fn test_state(&self, state: &PendingState) -> io::Result<()> {
        self.tests.set(self.tests.get() + 1);
        self.validate(state)
    }

    fn commit_state(&self, state: &PendingState) -> io::Result<()> {
        self.validate(state)?;
        self.commits.set(self.commits.get() + 1);
        Ok(())
    }

    fn add_framebuffer(&self, _buffer: &Dmabuf) -> io::Result<FbHandle> {
        if self.fail_imports.get() {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "import failure requested"));
        }
        self.imports.set(self.imports.get() + 1);
        Ok(self.next_handle())
    }

    fn create_cursor_framebuffer(&self, _size: Size<i32, Physical>) -> io::Result<FbHandle> {
        Ok(self.next_handle())
    }

    fn write_cursor(&self, fb: FbHandle, data: &[u8], stride: u32) -> io::Result<()> {
        if stride == 0 || data.len() % stride as usize != 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "malformed cursor image"));
        }
        self.cursor_writes.borrow_mut().push(fb);
        Ok(())
    }

    fn remove_framebuffer(&self, fb: FbHandle) {
        self.removed.borrow_mut().push(fb);
    }
}
