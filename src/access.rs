use core::ptr::NonNull;

/// Typed register access over the controller's register spaces.
///
/// The controller exposes four logical spaces: the PCIe-core configuration
/// space (DBI), the application/user block, the ATU region bank and the
/// controller-management block. On this part the last two are carved out of
/// the DBI aperture, so their accessors default to DBI forwarding;
/// implementations for variants with split apertures override them.
///
/// Reads take `&mut self`: status registers have read side effects and the
/// access layer is only ever driven through the controller's exclusive
/// borrow anyway.
///
/// `delay_us` backs the bounded poll loops: the platform sleeps somewhere in
/// `[min, max]` microseconds. It must yield rather than busy-spin.
pub trait PcieIo: Send {
    fn read_dbi(&mut self, reg: u32) -> u32;

    fn write_dbi(&mut self, reg: u32, val: u32);

    fn read_app(&mut self, reg: u32) -> u32;

    fn write_app(&mut self, reg: u32, val: u32);

    fn delay_us(&mut self, min: u32, max: u32);

    fn read_atu(&mut self, reg: u32) -> u32 {
        self.read_dbi(reg)
    }

    fn write_atu(&mut self, reg: u32, val: u32) {
        self.write_dbi(reg, val)
    }

    fn read_mgmt(&mut self, reg: u32) -> u32 {
        self.read_dbi(reg)
    }

    fn write_mgmt(&mut self, reg: u32, val: u32) {
        self.write_dbi(reg, val)
    }

    /// 16-bit DBI read, for capability fields narrower than a word.
    fn read_dbi16(&mut self, reg: u32) -> u16 {
        let word = self.read_dbi(reg & !0x3);
        (word >> ((reg & 0x2) * 8)) as u16
    }

    /// 16-bit DBI write via read-modify-write of the containing word.
    fn write_dbi16(&mut self, reg: u32, val: u16) {
        let aligned = reg & !0x3;
        let shift = (reg & 0x2) * 8;
        let mut word = self.read_dbi(aligned);
        word &= !(0xffff << shift);
        word |= (val as u32) << shift;
        self.write_dbi(aligned, word);
    }
}

/// Memory-mapped implementation over the controller's two apertures.
pub struct MmioIo {
    dbi_base: NonNull<u8>,
    app_base: NonNull<u8>,
    delay: fn(min: u32, max: u32),
}

unsafe impl Send for MmioIo {}

impl MmioIo {
    /// # Safety
    ///
    /// `dbi_base` and `app_base` must be valid, mapped apertures for this
    /// controller instance, and must stay mapped for the lifetime of the
    /// returned value. `delay` must sleep at least `min` microseconds.
    pub unsafe fn new(
        dbi_base: NonNull<u8>,
        app_base: NonNull<u8>,
        delay: fn(u32, u32),
    ) -> Self {
        Self {
            dbi_base,
            app_base,
            delay,
        }
    }

    fn reg_ptr(base: NonNull<u8>, reg: u32) -> NonNull<u32> {
        unsafe { base.add(reg as usize).cast() }
    }
}

impl PcieIo for MmioIo {
    fn read_dbi(&mut self, reg: u32) -> u32 {
        unsafe { Self::reg_ptr(self.dbi_base, reg).as_ptr().read_volatile() }
    }

    fn write_dbi(&mut self, reg: u32, val: u32) {
        unsafe { Self::reg_ptr(self.dbi_base, reg).as_ptr().write_volatile(val) }
    }

    fn read_app(&mut self, reg: u32) -> u32 {
        unsafe { Self::reg_ptr(self.app_base, reg).as_ptr().read_volatile() }
    }

    fn write_app(&mut self, reg: u32, val: u32) {
        unsafe { Self::reg_ptr(self.app_base, reg).as_ptr().write_volatile(val) }
    }

    fn delay_us(&mut self, min: u32, max: u32) {
        (self.delay)(min, max)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use alloc::collections::{BTreeMap, VecDeque};

    use super::PcieIo;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    pub enum Space {
        Dbi,
        App,
    }

    /// Register-file mock. Reads return the last written value unless the
    /// test scripted overriding values for that register.
    #[derive(Default)]
    pub struct MockIo {
        regs: BTreeMap<(Space, u32), u32>,
        scripted: BTreeMap<(Space, u32), VecDeque<u32>>,
        pub delays: u32,
    }

    impl MockIo {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set(&mut self, space: Space, reg: u32, val: u32) {
            self.regs.insert((space, reg), val);
        }

        pub fn get(&self, space: Space, reg: u32) -> u32 {
            self.regs.get(&(space, reg)).copied().unwrap_or(0)
        }

        /// Queue values that the next reads of `reg` return, ahead of the
        /// stored register content. Models status bits hardware flips.
        pub fn script_reads(&mut self, space: Space, reg: u32, vals: &[u32]) {
            self.scripted
                .entry((space, reg))
                .or_default()
                .extend(vals.iter().copied());
        }

        fn read(&mut self, space: Space, reg: u32) -> u32 {
            if let Some(q) = self.scripted.get_mut(&(space, reg)) {
                if let Some(v) = q.pop_front() {
                    return v;
                }
            }
            self.get(space, reg)
        }
    }

    impl PcieIo for MockIo {
        fn read_dbi(&mut self, reg: u32) -> u32 {
            self.read(Space::Dbi, reg)
        }

        fn write_dbi(&mut self, reg: u32, val: u32) {
            self.set(Space::Dbi, reg, val);
        }

        fn read_app(&mut self, reg: u32) -> u32 {
            self.read(Space::App, reg)
        }

        fn write_app(&mut self, reg: u32, val: u32) {
            self.set(Space::App, reg, val);
        }

        fn delay_us(&mut self, _min: u32, _max: u32) {
            self.delays += 1;
        }
    }
}
