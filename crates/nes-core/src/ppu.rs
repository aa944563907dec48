//! PPU (Picture Processing Unit) implementation
//!
//! The NES PPU is responsible for rendering graphics.
//! Key specs:
//! - NTSC: 262 scanlines of 341 dots, ~60Hz (59.94Hz)
//! - 256x240 visible pixels
//! - Sprite height: 8 or 16 pixels (configurable)
//! - Background tile size: 8x8 pixels
//!
//! Scanlines 0-239 are visible, 240 is idle, vblank starts at 241 dot 1 and
//! 261 is the pre-render line. Background tiles are fetched through the
//! loopy `v`/`t` address registers into 16-bit shifters one tile ahead of the
//! pixel being drawn. Sprites are evaluated at dot 1 and composited over the
//! finished background row at dot 256.

use crate::mapper::Mapper;

/// Visible width in pixels
pub const SCREEN_WIDTH: usize = 256;
/// Visible height in pixels
pub const SCREEN_HEIGHT: usize = 240;
pub const PALETTE_SIZE: usize = 32; // 32 bytes (8 palettes x 4 colors each)
pub const OAM_SIZE: usize = 256; // Object Attribute Memory

/// Dots per scanline
pub const DOTS_PER_SCANLINE: u16 = 341;
/// Scanlines per frame
pub const SCANLINES_PER_FRAME: u16 = 262;
/// First vblank scanline
pub const VBLANK_SCANLINE: u16 = 241;
/// Pre-render scanline
pub const PRE_RENDER_SCANLINE: u16 = 261;

/// Sprites drawn per scanline
const MAX_SPRITES_PER_LINE: usize = 8;

/// NTSC palette, packed 0x00RRGGBB
#[rustfmt::skip]
pub const NTSC_PALETTE: [u32; 64] = [
    0x7C7C7C, 0x0000FC, 0x0000BC, 0x4428BC, 0x940084, 0xA80020, 0xA81000, 0x881400,
    0x503000, 0x007800, 0x006800, 0x005800, 0x004058, 0x000000, 0x000000, 0x000000,
    0xBCBCBC, 0x0078F8, 0x0058F8, 0x6844FC, 0xD800CC, 0xE40058, 0xF83800, 0xE45C10,
    0xAC7C00, 0x00B800, 0x00A800, 0x00A844, 0x008888, 0x000000, 0x000000, 0x000000,
    0xF8F8F8, 0x3CBCFC, 0x6888FC, 0x9878F8, 0xF878F8, 0xF85898, 0xF87858, 0xFCA044,
    0xF8B800, 0xB8F818, 0x58D854, 0x58F898, 0x00E8D8, 0x787878, 0x000000, 0x000000,
    0xFCFCFC, 0xA4E4FC, 0xB8B8F8, 0xD8B8F8, 0xF8B8F8, 0xF8A4C0, 0xF0D0B0, 0xFCE0A8,
    0xF8D878, 0xD8F878, 0xB8F8B8, 0xB8F8D8, 0x00FCFC, 0xF8D8F8, 0x000000, 0x000000,
];

/// PPU control flags
#[derive(Debug, Clone, Copy)]
pub struct PpuCtrl(u8);

impl PpuCtrl {
    pub const NMI_ENABLE: u8 = 0b10000000;
    pub const MASTER_SLAVE: u8 = 0b01000000;
    pub const SPRITE_SIZE: u8 = 0b00100000;
    pub const BG_PATTERN_TABLE: u8 = 0b00010000;
    pub const SPR_PATTERN_TABLE: u8 = 0b00001000;
    pub const VRAM_INC: u8 = 0b00000100;
    pub const NAMETABLE: u8 = 0b00000011;

    pub fn new(val: u8) -> Self {
        Self(val)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn nmi_enable(&self) -> bool {
        (self.0 & Self::NMI_ENABLE) != 0
    }

    /// 8x16 sprites
    pub fn sprite_size(&self) -> bool {
        (self.0 & Self::SPRITE_SIZE) != 0
    }

    pub fn sprite_height(&self) -> u16 {
        if self.sprite_size() {
            16
        } else {
            8
        }
    }

    pub fn background_table(&self) -> u16 {
        if (self.0 & Self::BG_PATTERN_TABLE) != 0 {
            0x1000
        } else {
            0
        }
    }

    pub fn sprite_table(&self) -> u16 {
        if (self.0 & Self::SPR_PATTERN_TABLE) != 0 {
            0x1000
        } else {
            0
        }
    }

    pub fn vram_increment(&self) -> u16 {
        if (self.0 & Self::VRAM_INC) != 0 {
            32
        } else {
            1
        }
    }

    pub fn nametable(&self) -> u8 {
        self.0 & Self::NAMETABLE
    }
}

/// PPU status flags
#[derive(Debug, Clone, Copy)]
pub struct PpuStatus(u8);

impl PpuStatus {
    pub const VBLANK: u8 = 0b10000000;
    pub const SPRITE_ZERO_HIT: u8 = 0b01000000;
    pub const SPRITE_OVERFLOW: u8 = 0b00100000;

    pub fn new(val: u8) -> Self {
        Self(val)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn vblank(&self) -> bool {
        (self.0 & Self::VBLANK) != 0
    }

    pub fn sprite_zero_hit(&self) -> bool {
        (self.0 & Self::SPRITE_ZERO_HIT) != 0
    }

    pub fn sprite_overflow(&self) -> bool {
        (self.0 & Self::SPRITE_OVERFLOW) != 0
    }

    fn set(&mut self, mask: u8) {
        self.0 |= mask;
    }

    fn clear(&mut self, mask: u8) {
        self.0 &= !mask;
    }
}

/// PPU render mask flags
#[derive(Debug, Clone, Copy)]
pub struct PpuMask(u8);

impl PpuMask {
    pub const GRAYSCALE: u8 = 0b00000001;
    pub const SHOW_BG_LEFT: u8 = 0b00000010; // Bit 1 - background in left 8px
    pub const SHOW_SPR_LEFT: u8 = 0b00000100; // Bit 2 - sprites in left 8px
    pub const SHOW_BG: u8 = 0b00001000; // Bit 3 - render background
    pub const SHOW_SPR: u8 = 0b00010000; // Bit 4 - render sprites
    pub const EMPHASIZE_RED: u8 = 0b00100000;
    pub const EMPHASIZE_GREEN: u8 = 0b01000000;
    pub const EMPHASIZE_BLUE: u8 = 0b10000000;

    pub fn new(val: u8) -> Self {
        Self(val)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn grayscale(&self) -> bool {
        (self.0 & Self::GRAYSCALE) != 0
    }

    pub fn render_background(&self) -> bool {
        (self.0 & Self::SHOW_BG) != 0
    }

    pub fn render_sprites(&self) -> bool {
        (self.0 & Self::SHOW_SPR) != 0
    }

    pub fn background_left(&self) -> bool {
        (self.0 & Self::SHOW_BG_LEFT) != 0
    }

    pub fn sprites_left(&self) -> bool {
        (self.0 & Self::SHOW_SPR_LEFT) != 0
    }

    pub fn rendering_enabled(&self) -> bool {
        self.render_background() || self.render_sprites()
    }
}

/// Sprite copied into secondary OAM for the current scanline
#[derive(Debug, Clone, Copy, Default)]
struct LineSprite {
    y: u8,
    tile: u8,
    attributes: u8,
    x: u8,
    /// Sprite height latched at evaluation
    height: u8,
}

/// PPU internal state
#[derive(Debug, Clone)]
pub struct Ppu {
    control: PpuCtrl,
    mask: PpuMask,
    status: PpuStatus,
    /// Last value written to any register, seen in the low bits of $2002
    io_latch: u8,
    oam: [u8; OAM_SIZE],
    oam_addr: u8,
    secondary_oam: [LineSprite; MAX_SPRITES_PER_LINE],
    sprite_count: usize,
    sprite_zero_on_line: bool,
    palette: [u8; PALETTE_SIZE],

    /// Current VRAM address (15 bits)
    v: u16,
    /// Temporary VRAM address (15 bits)
    t: u16,
    /// Fine X scroll (3 bits)
    fine_x: u8,
    /// Write toggle for PPUSCROLL and PPUADDR
    w: bool,
    /// Read buffer (for PPUDATA)
    read_buffer: u8,

    // Background fetch latches and shifters
    next_tile_id: u8,
    next_tile_attr: u8,
    next_tile_lo: u8,
    next_tile_hi: u8,
    pattern_lo: u16,
    pattern_hi: u16,
    attr_lo: u16,
    attr_hi: u16,

    /// Palette RAM index per pixel of the current scanline
    line: [u8; SCREEN_WIDTH],
    frame: Vec<u32>,

    dot: u16,
    scanline: u16,
    odd_frame: bool,
    frame_ready: bool,
    nmi_pending: bool,
}

impl Ppu {
    /// Create a new PPU instance
    pub fn new() -> Self {
        Self {
            control: PpuCtrl::new(0),
            mask: PpuMask::new(0),
            status: PpuStatus::new(0),
            io_latch: 0,
            oam: [0; OAM_SIZE],
            oam_addr: 0,
            secondary_oam: [LineSprite::default(); MAX_SPRITES_PER_LINE],
            sprite_count: 0,
            sprite_zero_on_line: false,
            palette: [0; PALETTE_SIZE],
            v: 0,
            t: 0,
            fine_x: 0,
            w: false,
            read_buffer: 0,
            next_tile_id: 0,
            next_tile_attr: 0,
            next_tile_lo: 0,
            next_tile_hi: 0,
            pattern_lo: 0,
            pattern_hi: 0,
            attr_lo: 0,
            attr_hi: 0,
            line: [0; SCREEN_WIDTH],
            frame: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
            dot: 0,
            scanline: 0,
            odd_frame: false,
            frame_ready: false,
            nmi_pending: false,
        }
    }

    /// Reset the PPU
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advance one dot
    pub fn tick(&mut self, mapper: &mut Mapper) {
        let rendering = self.mask.rendering_enabled();

        if self.scanline < 240 || self.scanline == PRE_RENDER_SCANLINE {
            if self.scanline == PRE_RENDER_SCANLINE && self.dot == 1 {
                self.status.clear(
                    PpuStatus::VBLANK | PpuStatus::SPRITE_ZERO_HIT | PpuStatus::SPRITE_OVERFLOW,
                );
            }

            if self.scanline < 240 && self.dot == 1 {
                self.evaluate_sprites();
            }

            if rendering {
                self.background_cycle(mapper);
            }

            if self.scanline < 240 && (1..=256).contains(&self.dot) {
                self.line[(self.dot - 1) as usize] = self.background_pixel((self.dot - 1) as usize);
            }

            if self.scanline < 240 && self.dot == 256 {
                if self.mask.render_sprites() {
                    self.composite_sprites(mapper);
                }
                self.flush_line();
            }
        }

        if self.scanline == VBLANK_SCANLINE && self.dot == 1 {
            self.status.set(PpuStatus::VBLANK);
            self.frame_ready = true;
            if self.control.nmi_enable() {
                self.nmi_pending = true;
            }
        }

        self.advance(rendering);
    }

    fn advance(&mut self, rendering: bool) {
        // Odd frames drop the last dot of the pre-render line while rendering
        let skip = self.scanline == PRE_RENDER_SCANLINE
            && self.dot == DOTS_PER_SCANLINE - 2
            && self.odd_frame
            && rendering;

        self.dot += 1;
        if skip || self.dot >= DOTS_PER_SCANLINE {
            self.dot = 0;
            self.scanline += 1;
            if self.scanline >= SCANLINES_PER_FRAME {
                self.scanline = 0;
                self.odd_frame = !self.odd_frame;
            }
        }
    }

    /// Background fetches and scroll updates for the current dot
    fn background_cycle(&mut self, mapper: &Mapper) {
        let dot = self.dot;

        if (2..=257).contains(&dot) || (321..=337).contains(&dot) {
            self.shift_background();
            match (dot - 1) % 8 {
                0 => {
                    self.load_background_shifters();
                    self.next_tile_id = mapper.read_ppu(0x2000 | (self.v & 0x0FFF));
                }
                2 => {
                    let address = 0x23C0
                        | (self.v & 0x0C00)
                        | ((self.v >> 4) & 0x38)
                        | ((self.v >> 2) & 0x07);
                    let mut attr = mapper.read_ppu(address);
                    if self.v & 0x40 != 0 {
                        attr >>= 4;
                    }
                    if self.v & 0x02 != 0 {
                        attr >>= 2;
                    }
                    self.next_tile_attr = attr & 0x03;
                }
                4 => self.next_tile_lo = mapper.read_ppu(self.background_pattern_address()),
                6 => self.next_tile_hi = mapper.read_ppu(self.background_pattern_address() + 8),
                7 => self.increment_x(),
                _ => {}
            }
        }

        if dot == 256 {
            self.increment_y();
        }

        if dot == 257 {
            self.load_background_shifters();
            // Copy horizontal bits from t
            self.v = (self.v & !0x041F) | (self.t & 0x041F);
        }

        if self.scanline == PRE_RENDER_SCANLINE && (280..=304).contains(&dot) {
            // Copy vertical bits from t
            self.v = (self.v & !0x7BE0) | (self.t & 0x7BE0);
        }
    }

    fn background_pattern_address(&self) -> u16 {
        let fine_y = (self.v >> 12) & 0x07;
        self.control.background_table() + (self.next_tile_id as u16) * 16 + fine_y
    }

    fn shift_background(&mut self) {
        if self.mask.render_background() {
            self.pattern_lo <<= 1;
            self.pattern_hi <<= 1;
            self.attr_lo <<= 1;
            self.attr_hi <<= 1;
        }
    }

    fn load_background_shifters(&mut self) {
        self.pattern_lo = (self.pattern_lo & 0xFF00) | self.next_tile_lo as u16;
        self.pattern_hi = (self.pattern_hi & 0xFF00) | self.next_tile_hi as u16;
        let attr_lo = if self.next_tile_attr & 0x01 != 0 { 0xFF } else { 0x00 };
        let attr_hi = if self.next_tile_attr & 0x02 != 0 { 0xFF } else { 0x00 };
        self.attr_lo = (self.attr_lo & 0xFF00) | attr_lo;
        self.attr_hi = (self.attr_hi & 0xFF00) | attr_hi;
    }

    fn increment_x(&mut self) {
        if self.v & 0x001F == 31 {
            self.v &= !0x001F;
            self.v ^= 0x0400;
        } else {
            self.v += 1;
        }
    }

    fn increment_y(&mut self) {
        if self.v & 0x7000 != 0x7000 {
            self.v += 0x1000;
            return;
        }
        self.v &= !0x7000;
        let mut coarse_y = (self.v & 0x03E0) >> 5;
        if coarse_y == 29 {
            coarse_y = 0;
            self.v ^= 0x0800;
        } else if coarse_y == 31 {
            // Attribute rows wrap without switching nametables
            coarse_y = 0;
        } else {
            coarse_y += 1;
        }
        self.v = (self.v & !0x03E0) | (coarse_y << 5);
    }

    /// Palette RAM index of the background at column `x`, 0 when transparent
    fn background_pixel(&self, x: usize) -> u8 {
        if !self.mask.render_background() || (x < 8 && !self.mask.background_left()) {
            return 0;
        }
        let bit = 0x8000 >> self.fine_x;
        let pixel = ((self.pattern_lo & bit != 0) as u8) | (((self.pattern_hi & bit != 0) as u8) << 1);
        if pixel == 0 {
            return 0;
        }
        let palette = ((self.attr_lo & bit != 0) as u8) | (((self.attr_hi & bit != 0) as u8) << 1);
        (palette << 2) | pixel
    }

    /// Fill secondary OAM with the sprites covering this scanline
    fn evaluate_sprites(&mut self) {
        self.sprite_count = 0;
        self.sprite_zero_on_line = false;
        if !self.mask.rendering_enabled() {
            return;
        }

        let height = self.control.sprite_height();
        let scanline = self.scanline;
        for index in 0..64 {
            let entry = &self.oam[index * 4..index * 4 + 4];
            let top = entry[0] as u16 + 1;
            if scanline < top || scanline >= top + height {
                continue;
            }
            if self.sprite_count == MAX_SPRITES_PER_LINE {
                self.status.set(PpuStatus::SPRITE_OVERFLOW);
                break;
            }
            self.secondary_oam[self.sprite_count] = LineSprite {
                y: entry[0],
                tile: entry[1],
                attributes: entry[2],
                x: entry[3],
                height: height as u8,
            };
            if index == 0 {
                self.sprite_zero_on_line = true;
            }
            self.sprite_count += 1;
        }
    }

    /// Draw this line's sprites over the background row
    fn composite_sprites(&mut self, mapper: &Mapper) {
        let show_background = self.mask.render_background();

        for x in 0..SCREEN_WIDTH {
            if x < 8 && !self.mask.sprites_left() {
                continue;
            }
            // Lower OAM index wins, so take the first opaque sprite
            let Some((slot, sprite, pixel)) = (0..self.sprite_count).find_map(|slot| {
                let sprite = self.secondary_oam[slot];
                let column = x.checked_sub(sprite.x as usize).filter(|&c| c < 8)?;
                let pixel = self.sprite_pixel(mapper, sprite, column as u16);
                (pixel != 0).then_some((slot, sprite, pixel))
            }) else {
                continue;
            };

            let background = self.line[x];
            let background_opaque = background & 0x03 != 0;

            if slot == 0 && self.sprite_zero_on_line && background_opaque && show_background && x != 255 {
                self.status.set(PpuStatus::SPRITE_ZERO_HIT);
            }

            let behind = sprite.attributes & 0x20 != 0;
            if !behind || !background_opaque {
                self.line[x] = 0x10 | ((sprite.attributes & 0x03) << 2) | pixel;
            }
        }
    }

    /// 2-bit pattern value of a sprite at `column`
    fn sprite_pixel(&self, mapper: &Mapper, sprite: LineSprite, column: u16) -> u8 {
        let height = sprite.height as u16;
        let mut row = self.scanline - (sprite.y as u16 + 1);
        if sprite.attributes & 0x80 != 0 {
            row = height - 1 - row;
        }

        let address = if height == 16 {
            let table = (sprite.tile as u16 & 0x01) * 0x1000;
            let mut tile = sprite.tile as u16 & 0xFE;
            if row >= 8 {
                tile += 1;
                row -= 8;
            }
            table + tile * 16 + row
        } else {
            self.control.sprite_table() + sprite.tile as u16 * 16 + row
        };

        let lo = mapper.read_ppu(address);
        let hi = mapper.read_ppu(address + 8);
        let shift = if sprite.attributes & 0x40 != 0 { column } else { 7 - column };
        ((lo >> shift) & 0x01) | (((hi >> shift) & 0x01) << 1)
    }

    /// Translate the scanline buffer to RGB
    fn flush_line(&mut self) {
        let row = self.scanline as usize * SCREEN_WIDTH;
        let gray = if self.mask.grayscale() { 0x30 } else { 0x3F };
        for x in 0..SCREEN_WIDTH {
            let color = self.palette[palette_index(self.line[x] as u16)] & gray;
            self.frame[row + x] = NTSC_PALETTE[(color & 0x3F) as usize];
        }
    }

    /// CPU read of $2000-$2007
    pub fn read_register(&mut self, address: u16, mapper: &Mapper) -> u8 {
        match address & 0x07 {
            // $2002 - PPUSTATUS
            2 => {
                let value = (self.status.bits() & 0xE0) | (self.io_latch & 0x1F);
                self.status.clear(PpuStatus::VBLANK);
                self.w = false;
                value
            }
            // $2004 - OAMDATA
            4 => self.oam[self.oam_addr as usize],
            // $2007 - PPUDATA
            7 => {
                let address = self.v & 0x3FFF;
                let value = if address >= 0x3F00 {
                    // Palette reads are immediate; the buffer gets the nametable underneath
                    self.read_buffer = mapper.read_ppu(address - 0x1000);
                    self.palette[palette_index(address)]
                } else {
                    let value = self.read_buffer;
                    self.read_buffer = mapper.read_ppu(address);
                    value
                };
                self.increment_vram_address();
                value
            }
            // Write-only registers read back the bus latch
            _ => self.io_latch,
        }
    }

    /// CPU write of $2000-$2007
    pub fn write_register(&mut self, address: u16, value: u8, mapper: &mut Mapper) {
        self.io_latch = value;
        match address & 0x07 {
            // $2000 - PPUCTRL
            0 => {
                let was_enabled = self.control.nmi_enable();
                self.control = PpuCtrl::new(value);
                self.t = (self.t & !0x0C00) | ((value as u16 & 0x03) << 10);
                if !was_enabled && self.control.nmi_enable() && self.status.vblank() {
                    self.nmi_pending = true;
                }
            }
            // $2001 - PPUMASK
            1 => self.mask = PpuMask::new(value),
            // $2002 - PPUSTATUS (write has no effect)
            2 => {}
            // $2003 - OAMADDR
            3 => self.oam_addr = value,
            // $2004 - OAMDATA
            4 => self.write_oam_dma(value),
            // $2005 - PPUSCROLL
            5 => {
                if !self.w {
                    self.fine_x = value & 0x07;
                    self.t = (self.t & !0x001F) | (value as u16 >> 3);
                } else {
                    self.t = (self.t & !0x73E0)
                        | ((value as u16 & 0x07) << 12)
                        | ((value as u16 >> 3) << 5);
                }
                self.w = !self.w;
            }
            // $2006 - PPUADDR
            6 => {
                if !self.w {
                    self.t = (self.t & 0x00FF) | ((value as u16 & 0x3F) << 8);
                } else {
                    self.t = (self.t & 0xFF00) | value as u16;
                    self.v = self.t;
                }
                self.w = !self.w;
            }
            // $2007 - PPUDATA
            _ => {
                let address = self.v & 0x3FFF;
                if address >= 0x3F00 {
                    self.palette[palette_index(address)] = value & 0x3F;
                } else {
                    mapper.write_ppu(address, value);
                }
                self.increment_vram_address();
            }
        }
    }

    /// One byte of an OAM DMA transfer, stored at OAMADDR
    pub fn write_oam_dma(&mut self, value: u8) {
        self.oam[self.oam_addr as usize] = value;
        self.oam_addr = self.oam_addr.wrapping_add(1);
    }

    fn increment_vram_address(&mut self) {
        self.v = self.v.wrapping_add(self.control.vram_increment()) & 0x7FFF;
    }

    /// Return and clear the pending NMI edge
    pub fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.nmi_pending)
    }

    /// True once vblank has started for the current frame
    pub fn frame_ready(&self) -> bool {
        self.frame_ready
    }

    pub fn clear_frame_ready(&mut self) {
        self.frame_ready = false;
    }

    /// Completed frame, 256x240 packed 0x00RRGGBB
    pub fn frame_buffer(&self) -> &[u32] {
        &self.frame
    }

    /// Get PPU status
    pub fn status(&self) -> &PpuStatus {
        &self.status
    }

    /// Get PPU mask
    pub fn mask(&self) -> &PpuMask {
        &self.mask
    }

    /// Get PPU control
    pub fn control(&self) -> &PpuCtrl {
        &self.control
    }

    /// Check if VBLANK is active
    pub fn in_vblank(&self) -> bool {
        self.status.vblank()
    }

    /// Get current scanline
    pub fn scanline(&self) -> u16 {
        self.scanline
    }

    /// Get current dot
    pub fn dot(&self) -> u16 {
        self.dot
    }

    /// Current VRAM address register
    pub fn vram_address(&self) -> u16 {
        self.v
    }

    /// Temporary VRAM address register
    pub fn temp_address(&self) -> u16 {
        self.t
    }

    pub fn fine_x(&self) -> u8 {
        self.fine_x
    }

    /// PPUSCROLL/PPUADDR write toggle
    pub fn write_toggle(&self) -> bool {
        self.w
    }

    pub fn oam(&self) -> &[u8] {
        &self.oam
    }

    pub fn oam_addr(&self) -> u8 {
        self.oam_addr
    }

    pub fn palette(&self) -> &[u8] {
        &self.palette
    }

    pub fn odd_frame(&self) -> bool {
        self.odd_frame
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

/// Palette RAM index; $10/$14/$18/$1C mirror the background entries
fn palette_index(address: u16) -> usize {
    let index = (address & 0x1F) as usize;
    if index >= 0x10 && index & 0x03 == 0 {
        index - 0x10
    } else {
        index
    }
}
