//! Byte patterns that hint at direct hardware use in DOS images.

/// Named code pattern searched for in DOS images.
#[derive(Debug, Clone, Copy)]
pub struct Marker {
    pub name: &'static str,
    pub pattern: &'static [u8],
}

pub const DOS_MARKERS: &[Marker] = &[
    // mov ax,0013h / int 10h: switch to 320x200x256 graphics.
    Marker { name: "vga-mode-13h", pattern: &[0xB8, 0x13, 0x00, 0xCD, 0x10] },
    // mov al,13h / mov ah,00h variant.
    Marker { name: "vga-mode-13h", pattern: &[0xB0, 0x13, 0xB4, 0x00, 0xCD, 0x10] },
    // mov ax,0012h / int 10h: 640x480x16.
    Marker { name: "vga-mode-12h", pattern: &[0xB8, 0x12, 0x00, 0xCD, 0x10] },
    // mov ax,000Dh / int 10h: EGA 320x200.
    Marker { name: "ega-mode-0dh", pattern: &[0xB8, 0x0D, 0x00, 0xCD, 0x10] },
    // mov ax,4F02h: VESA set mode.
    Marker { name: "vesa-set-mode", pattern: &[0xB8, 0x02, 0x4F] },
    // mov ax,A000h: VGA frame buffer segment.
    Marker { name: "vga-framebuffer", pattern: &[0xB8, 0x00, 0xA0] },
    // mov dx,0226h: Sound Blaster DSP reset port.
    Marker { name: "sound-blaster-port", pattern: &[0xBA, 0x26, 0x02] },
    // mov dx,022Ch: Sound Blaster DSP write port.
    Marker { name: "sound-blaster-port", pattern: &[0xBA, 0x2C, 0x02] },
    // mov dx,0388h: AdLib / OPL2 register port.
    Marker { name: "adlib-port", pattern: &[0xBA, 0x88, 0x03] },
    // mov dx,0201h: game port (joystick).
    Marker { name: "joystick-port", pattern: &[0xBA, 0x01, 0x02] },
];

/// Distinct marker names present in `bytes`, in table order.
pub fn scan(bytes: &[u8]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for marker in DOS_MARKERS {
        if found.iter().any(|name| name == marker.name) {
            continue;
        }
        if contains(bytes, marker.pattern) {
            found.push(marker.name.to_string());
        }
    }
    found
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle)
}
