//! LCD register file, video memory and the scanline renderer.
//!
//! The renderer runs once per visible scanline over the current register
//! and memory state. Each background mode fills per-layer line buffers with
//! BGR555 colors (`None` = transparent), the sprite pass fills a priority
//! tagged object buffer, and the compositor resolves the final pixel:
//! candidates sorted by (priority, OBJ before BG, BG index), backdrop as
//! fallback, then the color special effects from BLDCNT.
//!
//! Output pixels are host-format RGB565.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

use self::object_attributes::{GfxMode, ObjAttributes};

pub mod object_attributes;

/// Visible display width in pixels.
pub const LCD_WIDTH: usize = 240;

/// Visible display height in scanlines.
pub const LCD_HEIGHT: usize = 160;

const PALETTE_SIZE: usize = 0x400;
const VRAM_SIZE: usize = 0x18000;
const OAM_SIZE: usize = 0x400;

/// Byte offset of the sprite tile area inside VRAM.
const OBJ_TILE_BASE: usize = 0x10000;

/// Byte offset of the sprite palette inside palette RAM.
const OBJ_PALETTE_BASE: usize = 0x200;

fn blank_framebuffer() -> Vec<u16> {
    vec![0; LCD_WIDTH * LCD_HEIGHT]
}

/// Convert a native BGR555 color to the host RGB565 format. The green
/// channel widens to six bits by duplicating its top bit.
#[must_use]
pub fn host_pixel(bgr555: u16) -> u16 {
    let red = bgr555.get_bits(0..=4);
    let green = bgr555.get_bits(5..=9);
    let blue = bgr555.get_bits(10..=14);
    let green6 = (green << 1) | (green >> 4);

    (red << 11) | (green6 << 5) | blue
}

#[derive(Clone, Copy)]
struct ObjPixel {
    color: u16,
    priority: u8,
    semi_transparent: bool,
}

/// Identity of the layer a composed pixel came from, for BLDCNT target
/// selection.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Layer {
    Bg(usize),
    Obj { semi_transparent: bool },
    Backdrop,
}

impl Layer {
    const fn target_bit(self) -> u8 {
        match self {
            Self::Bg(index) => index as u8,
            Self::Obj { .. } => 4,
            Self::Backdrop => 5,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct Lcd {
    /// LCD Control.
    pub dispcnt: u16,
    /// Undocumented green swap register; stored only.
    pub green_swap: u16,
    /// BG0-BG3 Control.
    pub bg_cnt: [u16; 4],
    /// BG0-BG3 horizontal scroll.
    pub bg_hofs: [u16; 4],
    /// BG0-BG3 vertical scroll.
    pub bg_vofs: [u16; 4],
    /// BG2 affine parameters dx/dmx/dy/dmy.
    pub bg2pa: u16,
    pub bg2pb: u16,
    pub bg2pc: u16,
    pub bg2pd: u16,
    /// BG2 reference point, 28-bit signed 20.8 fixed.
    pub bg2x: u32,
    pub bg2y: u32,
    pub bg3pa: u16,
    pub bg3pb: u16,
    pub bg3pc: u16,
    pub bg3pd: u16,
    pub bg3x: u32,
    pub bg3y: u32,
    /// Window dimension registers; stored, not yet applied by the
    /// compositor.
    pub win0h: u16,
    pub win1h: u16,
    pub win0v: u16,
    pub win1v: u16,
    pub winin: u16,
    pub winout: u16,
    /// Mosaic size.
    pub mosaic: u16,
    /// Color special effects selection.
    pub bldcnt: u16,
    /// Alpha blending coefficients.
    pub bldalpha: u16,
    /// Brightness coefficient.
    pub bldy: u16,

    /// Internal affine reference points, latched from BG2X/BG2Y writes and
    /// advanced by (PC, PD) per scanline.
    internal_bg2x: i32,
    internal_bg2y: i32,
    internal_bg3x: i32,
    internal_bg3y: i32,

    /// From 0x05000000, 1 KiB: BG palette then OBJ palette.
    palette_ram: Vec<u8>,
    /// From 0x06000000, 96 KiB.
    vram: Vec<u8>,
    /// From 0x07000000, 1 KiB.
    oam: Vec<u8>,

    /// Host-format output, row major.
    #[serde(skip, default = "blank_framebuffer")]
    framebuffer: Vec<u16>,
}

impl Default for Lcd {
    fn default() -> Self {
        Self {
            dispcnt: 0,
            green_swap: 0,
            bg_cnt: [0; 4],
            bg_hofs: [0; 4],
            bg_vofs: [0; 4],
            bg2pa: 0x0100,
            bg2pb: 0,
            bg2pc: 0,
            bg2pd: 0x0100,
            bg2x: 0,
            bg2y: 0,
            bg3pa: 0x0100,
            bg3pb: 0,
            bg3pc: 0,
            bg3pd: 0x0100,
            bg3x: 0,
            bg3y: 0,
            win0h: 0,
            win1h: 0,
            win0v: 0,
            win1v: 0,
            winin: 0,
            winout: 0,
            mosaic: 0,
            bldcnt: 0,
            bldalpha: 0,
            bldy: 0,
            internal_bg2x: 0,
            internal_bg2y: 0,
            internal_bg3x: 0,
            internal_bg3y: 0,
            palette_ram: vec![0; PALETTE_SIZE],
            vram: vec![0; VRAM_SIZE],
            oam: vec![0; OAM_SIZE],
            framebuffer: blank_framebuffer(),
        }
    }
}

const fn sign_extend_28(value: u32) -> i32 {
    ((value << 4) as i32) >> 4
}

impl Lcd {
    #[must_use]
    pub fn framebuffer(&self) -> &[u16] {
        &self.framebuffer
    }

    // ------------------------------------------------------------------
    // Memory windows
    // ------------------------------------------------------------------

    /// Palette RAM mirrors every 1 KiB.
    #[must_use]
    pub fn read_palette(&self, address: u32) -> u8 {
        self.palette_ram[address as usize % PALETTE_SIZE]
    }

    pub fn write_palette(&mut self, address: u32, value: u8) {
        self.palette_ram[address as usize % PALETTE_SIZE] = value;
    }

    /// An 8-bit CPU store to palette RAM writes the byte to both halves of
    /// the addressed halfword.
    pub fn write_palette_byte(&mut self, address: u32, value: u8) {
        let base = (address as usize % PALETTE_SIZE) & !1;
        self.palette_ram[base] = value;
        self.palette_ram[base + 1] = value;
    }

    /// The 96 KiB of VRAM sit in a 128 KiB window: the upper 32 KiB of the
    /// window mirror the object tile area.
    fn vram_offset(address: u32) -> usize {
        let mut offset = address as usize & 0x1FFFF;
        if offset >= VRAM_SIZE {
            offset -= 0x8000;
        }
        offset
    }

    #[must_use]
    pub fn read_vram(&self, address: u32) -> u8 {
        self.vram[Self::vram_offset(address)]
    }

    pub fn write_vram(&mut self, address: u32, value: u8) {
        self.vram[Self::vram_offset(address)] = value;
    }

    /// OAM mirrors every 1 KiB. 8-bit CPU stores are ignored; this is the
    /// raw path used by 16/32-bit accesses.
    #[must_use]
    pub fn read_oam(&self, address: u32) -> u8 {
        self.oam[address as usize % OAM_SIZE]
    }

    pub fn write_oam(&mut self, address: u32, value: u8) {
        self.oam[address as usize % OAM_SIZE] = value;
    }

    // ------------------------------------------------------------------
    // Affine reference points
    // ------------------------------------------------------------------

    /// BG2X/BG2Y/BG3X/BG3Y writes latch straight into the internal
    /// reference points.
    pub fn write_bg2x_byte(&mut self, byte: u8, value: u8) {
        self.bg2x.set_byte(byte, value);
        self.internal_bg2x = sign_extend_28(self.bg2x);
    }

    pub fn write_bg2y_byte(&mut self, byte: u8, value: u8) {
        self.bg2y.set_byte(byte, value);
        self.internal_bg2y = sign_extend_28(self.bg2y);
    }

    pub fn write_bg3x_byte(&mut self, byte: u8, value: u8) {
        self.bg3x.set_byte(byte, value);
        self.internal_bg3x = sign_extend_28(self.bg3x);
    }

    pub fn write_bg3y_byte(&mut self, byte: u8, value: u8) {
        self.bg3y.set_byte(byte, value);
        self.internal_bg3y = sign_extend_28(self.bg3y);
    }

    /// Advance the affine reference points to the next scanline.
    pub fn advance_affine_refs(&mut self) {
        self.internal_bg2x += i32::from(self.bg2pc as i16);
        self.internal_bg2y += i32::from(self.bg2pd as i16);
        self.internal_bg3x += i32::from(self.bg3pc as i16);
        self.internal_bg3y += i32::from(self.bg3pd as i16);
    }

    fn reload_affine_refs(&mut self) {
        self.internal_bg2x = sign_extend_28(self.bg2x);
        self.internal_bg2y = sign_extend_28(self.bg2y);
        self.internal_bg3x = sign_extend_28(self.bg3x);
        self.internal_bg3y = sign_extend_28(self.bg3y);
    }

    // ------------------------------------------------------------------
    // Palette lookups
    // ------------------------------------------------------------------

    fn bg_palette_color(&self, index: usize) -> u16 {
        let offset = index * 2;
        u16::from(self.palette_ram[offset]) | (u16::from(self.palette_ram[offset + 1]) << 8)
    }

    fn obj_palette_color(&self, index: usize) -> u16 {
        let offset = OBJ_PALETTE_BASE + index * 2;
        u16::from(self.palette_ram[offset]) | (u16::from(self.palette_ram[offset + 1]) << 8)
    }

    fn backdrop_color(&self) -> u16 {
        self.bg_palette_color(0)
    }

    fn vram_u16(&self, offset: usize) -> u16 {
        u16::from(self.vram[offset]) | (u16::from(self.vram[offset + 1]) << 8)
    }

    // ------------------------------------------------------------------
    // Scanline rendering
    // ------------------------------------------------------------------

    /// Render one visible scanline into the framebuffer.
    pub fn render_scanline(&mut self, line: u16) {
        let y = line as usize;
        if y >= LCD_HEIGHT {
            return;
        }
        if y == 0 {
            self.reload_affine_refs();
        }

        let mode = self.dispcnt.get_bits(0..=2);
        let mut bg_lines = [[None::<u16>; LCD_WIDTH]; 4];

        let enabled = |bg: usize| self.dispcnt.get_bit(8 + bg as u8);

        match mode {
            0 => {
                for bg in 0..4 {
                    if enabled(bg) {
                        self.render_text_line(bg, y, &mut bg_lines[bg]);
                    }
                }
            }
            1 => {
                for bg in 0..2 {
                    if enabled(bg) {
                        self.render_text_line(bg, y, &mut bg_lines[bg]);
                    }
                }
                if enabled(2) {
                    self.render_affine_line(2, &mut bg_lines[2]);
                }
            }
            2 => {
                if enabled(2) {
                    self.render_affine_line(2, &mut bg_lines[2]);
                }
                if enabled(3) {
                    self.render_affine_line(3, &mut bg_lines[3]);
                }
            }
            3 => {
                if enabled(2) {
                    self.render_bitmap16_line(y, LCD_WIDTH, LCD_HEIGHT, 0, &mut bg_lines[2]);
                }
            }
            4 => {
                if enabled(2) {
                    self.render_bitmap8_line(y, &mut bg_lines[2]);
                }
            }
            5 => {
                if enabled(2) {
                    self.render_bitmap16_line(y, 160, 128, self.frame_page(), &mut bg_lines[2]);
                }
            }
            _ => {}
        }

        let obj_line = if self.dispcnt.get_bit(12) {
            self.render_obj_line(y)
        } else {
            [None; LCD_WIDTH]
        };

        self.compose_line(y, mode, &bg_lines, &obj_line);
    }

    fn frame_page(&self) -> usize {
        if self.dispcnt.get_bit(4) {
            0xA000
        } else {
            0
        }
    }

    fn render_text_line(&self, bg: usize, y: usize, out: &mut [Option<u16>; LCD_WIDTH]) {
        let cnt = self.bg_cnt[bg];
        let hofs = usize::from(self.bg_hofs[bg] & 0x1FF);
        let vofs = usize::from(self.bg_vofs[bg] & 0x1FF);

        let screen_base = usize::from(cnt.get_bits(8..=12)) * 0x800;
        let char_base = usize::from(cnt.get_bits(2..=3)) * 0x4000;
        let bpp8 = cnt.get_bit(7);
        let screen_size = cnt.get_bits(14..=15);

        let map_w = if screen_size & 1 != 0 { 512 } else { 256 };
        let map_h = if screen_size & 2 != 0 { 512 } else { 256 };

        for sx in 0..LCD_WIDTH {
            let mut mx = (sx + hofs) % map_w;
            let mut my = (y + vofs) % map_h;

            // Maps larger than 256 pixels are split into 2 KiB screen
            // blocks: right block at +0x800, lower row after all upper
            // blocks.
            let mut screen_offset = 0;
            if mx >= 256 {
                screen_offset += 0x800;
                mx -= 256;
            }
            if my >= 256 {
                screen_offset += if map_w == 512 { 0x1000 } else { 0x800 };
                my -= 256;
            }

            let (tx, ty) = (mx / 8, my / 8);
            let entry_offset = (screen_base + screen_offset + (ty * 32 + tx) * 2) & 0xFFFE;
            let entry = self.vram_u16(entry_offset);

            let tile_number = usize::from(entry.get_bits(0..=9));
            let h_flip = entry.get_bit(10);
            let v_flip = entry.get_bit(11);
            let palette_bank = usize::from(entry.get_bits(12..=15));

            let px = if h_flip { 7 - mx % 8 } else { mx % 8 };
            let py = if v_flip { 7 - my % 8 } else { my % 8 };

            let color_index = if bpp8 {
                usize::from(self.vram[(char_base + tile_number * 64 + py * 8 + px) & 0xFFFF])
            } else {
                let data = self.vram[(char_base + tile_number * 32 + py * 4 + px / 2) & 0xFFFF];
                let nibble = if px & 1 != 0 { data >> 4 } else { data & 0xF };
                if nibble == 0 {
                    0
                } else {
                    palette_bank * 16 + usize::from(nibble)
                }
            };

            // Color index 0 is transparent in every tiled mode.
            if color_index != 0 {
                out[sx] = Some(self.bg_palette_color(color_index));
            }
        }
    }

    fn render_affine_line(&self, bg: usize, out: &mut [Option<u16>; LCD_WIDTH]) {
        let cnt = self.bg_cnt[bg];
        let screen_base = usize::from(cnt.get_bits(8..=12)) * 0x800;
        let char_base = usize::from(cnt.get_bits(2..=3)) * 0x4000;
        let wrap = cnt.get_bit(13);
        // 128, 256, 512 or 1024 pixels square.
        let size = 128_i32 << cnt.get_bits(14..=15);
        let tiles_per_row = (size / 8) as usize;

        let (pa, pb, mut x, mut y) = if bg == 2 {
            (
                i32::from(self.bg2pa as i16),
                i32::from(self.bg2pb as i16),
                self.internal_bg2x,
                self.internal_bg2y,
            )
        } else {
            (
                i32::from(self.bg3pa as i16),
                i32::from(self.bg3pb as i16),
                self.internal_bg3x,
                self.internal_bg3y,
            )
        };

        for pixel in out.iter_mut() {
            let mut px = x >> 8;
            let mut py = y >> 8;
            x += pa;
            y += pb;

            if wrap {
                px = px.rem_euclid(size);
                py = py.rem_euclid(size);
            } else if px < 0 || py < 0 || px >= size || py >= size {
                continue;
            }

            let (px, py) = (px as usize, py as usize);
            let tile_number = usize::from(
                self.vram[(screen_base + (py / 8) * tiles_per_row + px / 8) & 0xFFFF],
            );
            // Affine tiles are always 8 bpp.
            let color_index =
                usize::from(self.vram[(char_base + tile_number * 64 + (py % 8) * 8 + px % 8) & 0xFFFF]);

            if color_index != 0 {
                *pixel = Some(self.bg_palette_color(color_index));
            }
        }
    }

    fn render_bitmap16_line(
        &self,
        y: usize,
        width: usize,
        height: usize,
        page: usize,
        out: &mut [Option<u16>; LCD_WIDTH],
    ) {
        if y >= height {
            return;
        }
        for (sx, pixel) in out.iter_mut().enumerate().take(width) {
            let offset = page + (y * width + sx) * 2;
            *pixel = Some(self.vram_u16(offset));
        }
    }

    fn render_bitmap8_line(&self, y: usize, out: &mut [Option<u16>; LCD_WIDTH]) {
        let page = self.frame_page();
        for (sx, pixel) in out.iter_mut().enumerate() {
            let color_index = usize::from(self.vram[page + y * LCD_WIDTH + sx]);
            if color_index != 0 {
                *pixel = Some(self.bg_palette_color(color_index));
            }
        }
    }

    fn render_obj_line(&self, y: usize) -> [Option<ObjPixel>; LCD_WIDTH] {
        let mut out = [None::<ObjPixel>; LCD_WIDTH];
        let one_dimensional = self.dispcnt.get_bit(6);

        // Reverse order: on a priority tie the lower OAM index must end up
        // on top, so later entries are drawn first and overwritten.
        for index in (0..128).rev() {
            let base = index * 8;
            let attr = |n: usize| {
                u16::from(self.oam[base + n * 2]) | (u16::from(self.oam[base + n * 2 + 1]) << 8)
            };
            let obj = ObjAttributes::decode(attr(0), attr(1), attr(2));

            if obj.disabled || obj.gfx_mode == GfxMode::Prohibited {
                continue;
            }
            let Some((w, h)) = obj.dimensions() else {
                continue;
            };
            let (w, h) = (i32::from(w), i32::from(h));

            // Coordinates wrap at 512 horizontally and 256 vertically.
            let mut x0 = i32::from(obj.x);
            if x0 >= LCD_WIDTH as i32 {
                x0 -= 512;
            }
            let mut y0 = i32::from(obj.y);
            if y0 >= LCD_HEIGHT as i32 {
                y0 -= 256;
            }

            let row = y as i32 - y0;
            if row < 0 || row >= h {
                continue;
            }

            for col in 0..w {
                let screen_x = x0 + col;
                if !(0..LCD_WIDTH as i32).contains(&screen_x) {
                    continue;
                }

                let px = if obj.h_flip { w - 1 - col } else { col } as usize;
                let py = if obj.v_flip { h - 1 - row } else { row } as usize;

                let tiles_per_sprite_row = w as usize / 8;
                // In 8 bpp a tile is 64 bytes, two 32-byte tile units.
                let unit_step = if obj.bpp8 { 2 } else { 1 };
                let unit_offset = if one_dimensional {
                    (py / 8) * tiles_per_sprite_row * unit_step + (px / 8) * unit_step
                } else {
                    (py / 8) * 32 + (px / 8) * unit_step
                };
                // 1024 32-byte units fit in the sprite tile area.
                let tile_unit = (usize::from(obj.tile_number) + unit_offset) & 0x3FF;
                let tile_addr = OBJ_TILE_BASE + tile_unit * 32;

                let color_index = if obj.bpp8 {
                    usize::from(self.vram[(tile_addr + (py % 8) * 8 + px % 8) & 0x17FFF])
                } else {
                    let data = self.vram[(tile_addr + (py % 8) * 4 + (px % 8) / 2) & 0x17FFF];
                    let nibble = if px & 1 != 0 { data >> 4 } else { data & 0xF };
                    if nibble == 0 {
                        0
                    } else {
                        usize::from(obj.palette_bank) * 16 + usize::from(nibble)
                    }
                };

                if color_index == 0 {
                    continue;
                }

                // Window sprites shape the object window, never color.
                if obj.gfx_mode == GfxMode::ObjectWindow {
                    continue;
                }

                let candidate = ObjPixel {
                    color: self.obj_palette_color(color_index),
                    priority: obj.priority,
                    semi_transparent: obj.gfx_mode == GfxMode::SemiTransparent,
                };

                let slot = &mut out[screen_x as usize];
                match slot {
                    Some(current) if candidate.priority > current.priority => {}
                    _ => *slot = Some(candidate),
                }
            }
        }

        out
    }

    // ------------------------------------------------------------------
    // Composition
    // ------------------------------------------------------------------

    fn compose_line(
        &mut self,
        y: usize,
        mode: u16,
        bg_lines: &[[Option<u16>; LCD_WIDTH]; 4],
        obj_line: &[Option<ObjPixel>; LCD_WIDTH],
    ) {
        // Backgrounds that can legally appear in the current mode.
        let mode_legal: [bool; 4] = match mode {
            0 => [true, true, true, true],
            1 => [true, true, true, false],
            2 => [false, false, true, true],
            3..=5 => [false, false, true, false],
            _ => [false; 4],
        };

        let bg_priority: [u8; 4] = [
            (self.bg_cnt[0] & 3) as u8,
            (self.bg_cnt[1] & 3) as u8,
            (self.bg_cnt[2] & 3) as u8,
            (self.bg_cnt[3] & 3) as u8,
        ];

        let backdrop = self.backdrop_color();
        let blend_mode = self.bldcnt.get_bits(6..=7);
        let eva = u32::from(self.bldalpha.get_bits(0..=4)).min(16);
        let evb = u32::from(self.bldalpha.get_bits(8..=12)).min(16);
        let evy = u32::from(self.bldy.get_bits(0..=4)).min(16);

        for sx in 0..LCD_WIDTH {
            // Gather the top two candidates in composition order.
            let mut top: Option<(u16, Layer)> = None;
            let mut below: Option<(u16, Layer)> = None;

            'collect: for priority in 0..4_u8 {
                if let Some(obj) = obj_line[sx] {
                    if obj.priority == priority {
                        let entry = (
                            obj.color,
                            Layer::Obj {
                                semi_transparent: obj.semi_transparent,
                            },
                        );
                        if top.is_none() {
                            top = Some(entry);
                        } else {
                            below = Some(entry);
                            break 'collect;
                        }
                    }
                }
                for bg in 0..4 {
                    if !mode_legal[bg] || bg_priority[bg] != priority {
                        continue;
                    }
                    if let Some(color) = bg_lines[bg][sx] {
                        let entry = (color, Layer::Bg(bg));
                        if top.is_none() {
                            top = Some(entry);
                        } else {
                            below = Some(entry);
                            break 'collect;
                        }
                    }
                }
            }

            if below.is_none() {
                let entry = (backdrop, Layer::Backdrop);
                if top.is_none() {
                    top = Some(entry);
                } else {
                    below = Some(entry);
                }
            }

            let (top_color, top_layer) = top.unwrap_or((backdrop, Layer::Backdrop));
            let first_target = self.bldcnt.get_bit(top_layer.target_bit());
            let second_target = below
                .map(|(_, layer)| self.bldcnt.get_bit(8 + layer.target_bit()))
                .unwrap_or(false);

            let semi_sprite = matches!(
                top_layer,
                Layer::Obj {
                    semi_transparent: true
                }
            );

            let final_color = if semi_sprite && second_target {
                // Semi-transparent sprites blend whenever a second target
                // lies below, regardless of the selected mode.
                alpha_blend(top_color, below.map_or(backdrop, |(c, _)| c), eva, evb)
            } else {
                match blend_mode {
                    1 if first_target && second_target => {
                        alpha_blend(top_color, below.map_or(backdrop, |(c, _)| c), eva, evb)
                    }
                    2 if first_target => brighten(top_color, evy),
                    3 if first_target => darken(top_color, evy),
                    _ => top_color,
                }
            };

            self.framebuffer[y * LCD_WIDTH + sx] = host_pixel(final_color);
        }
    }
}

fn channels(color: u16) -> (u32, u32, u32) {
    (
        u32::from(color.get_bits(0..=4)),
        u32::from(color.get_bits(5..=9)),
        u32::from(color.get_bits(10..=14)),
    )
}

fn from_channels(r: u32, g: u32, b: u32) -> u16 {
    (r | (g << 5) | (b << 10)) as u16
}

fn alpha_blend(top: u16, bottom: u16, eva: u32, evb: u32) -> u16 {
    let (r1, g1, b1) = channels(top);
    let (r2, g2, b2) = channels(bottom);

    from_channels(
        ((r1 * eva + r2 * evb) >> 4).min(31),
        ((g1 * eva + g2 * evb) >> 4).min(31),
        ((b1 * eva + b2 * evb) >> 4).min(31),
    )
}

fn brighten(color: u16, evy: u32) -> u16 {
    let (r, g, b) = channels(color);
    from_channels(
        r + (((31 - r) * evy) >> 4),
        g + (((31 - g) * evy) >> 4),
        b + (((31 - b) * evy) >> 4),
    )
}

fn darken(color: u16, evy: u32) -> u16 {
    let (r, g, b) = channels(color);
    from_channels(r - ((r * evy) >> 4), g - ((g * evy) >> 4), b - ((b * evy) >> 4))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_vram_u16(lcd: &mut Lcd, offset: u32, value: u16) {
        lcd.write_vram(offset, value as u8);
        lcd.write_vram(offset + 1, (value >> 8) as u8);
    }

    fn write_palette_u16(lcd: &mut Lcd, offset: u32, value: u16) {
        lcd.write_palette(offset, value as u8);
        lcd.write_palette(offset + 1, (value >> 8) as u8);
    }

    fn write_oam_u16(lcd: &mut Lcd, offset: u32, value: u16) {
        lcd.write_oam(offset, value as u8);
        lcd.write_oam(offset + 1, (value >> 8) as u8);
    }

    #[test]
    fn host_pixel_conversion() {
        // Pure red (BGR555 low bits) lands in the RGB565 top bits.
        assert_eq!(host_pixel(0x001F), 0xF800);
        // Pure green widens to six bits.
        assert_eq!(host_pixel(0x03E0), 0x07E0);
        // Pure blue.
        assert_eq!(host_pixel(0x7C00), 0x001F);
        // White.
        assert_eq!(host_pixel(0x7FFF), 0xFFFF);
    }

    #[test]
    fn backdrop_fills_disabled_display() {
        let mut lcd = Lcd::default();
        write_palette_u16(&mut lcd, 0, 0x7C00);

        lcd.render_scanline(0);
        assert!(lcd
            .framebuffer()
            .iter()
            .take(LCD_WIDTH)
            .all(|&pixel| pixel == host_pixel(0x7C00)));
    }

    #[test]
    fn text_mode_solid_tile_covers_screen() {
        let mut lcd = Lcd::default();
        // Mode 0, BG0 enabled, characters in block 1 so the map in block 0
        // does not alias them.
        lcd.dispcnt = 1 << 8;
        lcd.bg_cnt[0] = 1 << 2;

        // Tile 0, 4 bpp, all pixels color index 1.
        for i in 0..32 {
            lcd.write_vram(0x4000 + i, 0x11);
        }
        // Screen block 0 already reads as tile 0, palette bank 0.
        write_palette_u16(&mut lcd, 2, 0x03E0);

        for line in 0..LCD_HEIGHT as u16 {
            lcd.render_scanline(line);
        }

        assert!(lcd
            .framebuffer()
            .iter()
            .all(|&pixel| pixel == host_pixel(0x03E0)));
    }

    #[test]
    fn text_mode_scroll_wraps() {
        let mut lcd = Lcd::default();
        lcd.dispcnt = 1 << 8;
        lcd.bg_cnt[0] = 1 << 2;

        // Two tiles: tile 0 transparent, tile 1 solid color 1.
        for i in 0..32 {
            lcd.write_vram(0x4000 + 32 + i, 0x11);
        }
        // Map entry (0,0) = tile 1; everything else tile 0.
        write_vram_u16(&mut lcd, 0, 1);
        write_palette_u16(&mut lcd, 2, 0x001F);
        write_palette_u16(&mut lcd, 0, 0);

        lcd.bg_hofs[0] = 8;
        lcd.render_scanline(0);

        // The solid tile scrolled off the left edge; it reappears at the
        // right edge of the 256-pixel map only if within 240. Column
        // 256-8=248 is off screen, so the whole line is backdrop.
        assert!(lcd.framebuffer()[..LCD_WIDTH]
            .iter()
            .all(|&pixel| pixel == host_pixel(0)));

        lcd.bg_hofs[0] = 0x1FF & 8_u16.wrapping_neg();
        lcd.render_scanline(0);
        // Scrolling -8 instead puts the tile at columns 8-15.
        assert_eq!(lcd.framebuffer()[8], host_pixel(0x001F));
        assert_eq!(lcd.framebuffer()[7], host_pixel(0));
    }

    #[test]
    fn bitmap_mode3_direct_color() {
        let mut lcd = Lcd::default();
        lcd.dispcnt = 3 | (1 << 10);

        write_vram_u16(&mut lcd, ((17 * LCD_WIDTH + 23) * 2) as u32, 0x7FFF);
        lcd.render_scanline(17);

        assert_eq!(lcd.framebuffer()[17 * LCD_WIDTH + 23], host_pixel(0x7FFF));
        assert_eq!(lcd.framebuffer()[17 * LCD_WIDTH + 24], host_pixel(0));
    }

    #[test]
    fn bitmap_mode4_pages() {
        let mut lcd = Lcd::default();
        lcd.dispcnt = 4 | (1 << 10);
        write_palette_u16(&mut lcd, 2, 0x001F);

        // Page 0 pixel.
        lcd.write_vram(5, 1);
        // Page 1 pixel elsewhere.
        lcd.write_vram(0xA000 + 9, 1);

        lcd.render_scanline(0);
        assert_eq!(lcd.framebuffer()[5], host_pixel(0x001F));
        assert_eq!(lcd.framebuffer()[9], host_pixel(0));

        lcd.dispcnt.set_bit_on(4);
        lcd.render_scanline(0);
        assert_eq!(lcd.framebuffer()[5], host_pixel(0));
        assert_eq!(lcd.framebuffer()[9], host_pixel(0x001F));
    }

    #[test]
    fn sprite_bounds_and_color() {
        let mut lcd = Lcd::default();
        // Mode 0, OBJ on, 1D mapping.
        lcd.dispcnt = (1 << 12) | (1 << 6);

        // 16x16, 8 bpp sprite at (120, 80), tile 0, all pixels color 1.
        write_oam_u16(&mut lcd, 0, 80 | (1 << 13));
        write_oam_u16(&mut lcd, 2, 120 | (1 << 14));
        write_oam_u16(&mut lcd, 4, 0);

        for i in 0..16 * 16 {
            lcd.write_vram(OBJ_TILE_BASE as u32 + i, 1);
        }
        write_palette_u16(&mut lcd, OBJ_PALETTE_BASE as u32 + 2, 0x001F);

        for line in 0..LCD_HEIGHT as u16 {
            lcd.render_scanline(line);
        }

        let blue = host_pixel(0x001F);
        let backdrop = host_pixel(0);
        for y in 0..LCD_HEIGHT {
            for x in 0..LCD_WIDTH {
                let expected = if (120..136).contains(&x) && (80..96).contains(&y) {
                    blue
                } else {
                    backdrop
                };
                assert_eq!(
                    lcd.framebuffer()[y * LCD_WIDTH + x],
                    expected,
                    "pixel ({x},{y})"
                );
            }
        }
    }

    #[test]
    fn sprite_wraps_at_world_edges() {
        let mut lcd = Lcd::default();
        lcd.dispcnt = (1 << 12) | (1 << 6);

        // 8x8 4 bpp sprite at x=508: wraps to -4, so columns 0-3 show.
        write_oam_u16(&mut lcd, 0, 10);
        write_oam_u16(&mut lcd, 2, 508);
        write_oam_u16(&mut lcd, 4, 0);

        for i in 0..32 {
            lcd.write_vram(OBJ_TILE_BASE as u32 + i, 0x11);
        }
        write_palette_u16(&mut lcd, OBJ_PALETTE_BASE as u32 + 2, 0x001F);

        lcd.render_scanline(10);
        let blue = host_pixel(0x001F);
        assert_eq!(lcd.framebuffer()[10 * LCD_WIDTH], blue);
        assert_eq!(lcd.framebuffer()[10 * LCD_WIDTH + 3], blue);
        assert_eq!(lcd.framebuffer()[10 * LCD_WIDTH + 4], host_pixel(0));
    }

    #[test]
    fn sprite_priority_tie_prefers_lower_oam_index() {
        let mut lcd = Lcd::default();
        lcd.dispcnt = (1 << 12) | (1 << 6);

        // Both 8x8 4 bpp at the same spot, same priority; entry 0 uses
        // palette bank 0, entry 1 bank 1.
        write_oam_u16(&mut lcd, 0, 0);
        write_oam_u16(&mut lcd, 2, 0);
        write_oam_u16(&mut lcd, 4, 0);
        write_oam_u16(&mut lcd, 8, 0);
        write_oam_u16(&mut lcd, 10, 0);
        write_oam_u16(&mut lcd, 12, 1 << 12);

        for i in 0..32 {
            lcd.write_vram(OBJ_TILE_BASE as u32 + i, 0x11);
        }
        write_palette_u16(&mut lcd, OBJ_PALETTE_BASE as u32 + 2, 0x001F);
        write_palette_u16(&mut lcd, OBJ_PALETTE_BASE as u32 + 34, 0x03E0);

        lcd.render_scanline(0);
        assert_eq!(lcd.framebuffer()[0], host_pixel(0x001F));
    }

    #[test]
    fn alpha_blend_math() {
        // BG0 first target, BG1 second target, eva = evb = 8.
        let mut lcd = Lcd::default();
        lcd.dispcnt = (1 << 8) | (1 << 9);
        lcd.bldcnt = (1 << 6) | 0b1 | (0b10 << 8);
        lcd.bldalpha = 8 | (8 << 8);
        // Characters in block 1; BG0 priority 0 with map block 0, BG1
        // priority 1 with map block 1.
        lcd.bg_cnt[0] = 1 << 2;
        lcd.bg_cnt[1] = 1 | (1 << 2) | (1 << 8);

        // Tile 1 solid color 1 for BG0, tile 2 solid color 2 for BG1.
        for i in 0..32 {
            lcd.write_vram(0x4000 + 32 + i, 0x11);
            lcd.write_vram(0x4000 + 64 + i, 0x22);
        }
        for entry in 0..32 * 32 {
            write_vram_u16(&mut lcd, entry * 2, 1);
            write_vram_u16(&mut lcd, 0x800 + entry * 2, 2);
        }

        // c1 = red 31, c2 = red 15.
        write_palette_u16(&mut lcd, 2, 31);
        write_palette_u16(&mut lcd, 4, 15);

        lcd.render_scanline(0);

        let expected = (31_u32 * 8 + 15 * 8) >> 4;
        assert_eq!(lcd.framebuffer()[0], host_pixel(expected as u16));
    }

    #[test]
    fn brightness_effects_clamp() {
        assert_eq!(brighten(0x7FFF, 16), 0x7FFF);
        assert_eq!(brighten(0, 16), 0x7FFF);
        assert_eq!(darken(0x7FFF, 16), 0);
        // evy 0 leaves the color untouched.
        assert_eq!(brighten(0x1234, 0), 0x1234);
        assert_eq!(darken(0x1234, 0), 0x1234);
    }

    #[test]
    fn affine_reference_latch_and_advance() {
        let mut lcd = Lcd::default();
        lcd.write_bg2x_byte(0, 0x80);
        lcd.write_bg2x_byte(1, 0x00);
        assert_eq!(lcd.internal_bg2x, 0x80);

        lcd.bg2pc = 0x0100;
        lcd.bg2pd = (-0x100_i16) as u16;
        lcd.advance_affine_refs();
        assert_eq!(lcd.internal_bg2x, 0x180);
        assert_eq!(lcd.internal_bg2y, -0x100);
    }

    #[test]
    fn vram_window_mirror() {
        let mut lcd = Lcd::default();
        lcd.write_vram(0x10000, 0xAB);
        // 0x18000 mirrors back into the object tile area.
        assert_eq!(lcd.read_vram(0x18000), 0xAB);
    }
}
