// vis.rs — run-length visibility decompression
//
// Per-leaf visibility is stored compressed: a zero byte is followed by a
// repeat count of zero bytes, anything else is literal. Leafs without data
// are treated as seeing everything.

use crate::console::com_dprintf;
use crate::level::LevelModel;

/// Bytes in one uncompressed visibility row.
pub fn vis_row_bytes(numleafs: usize) -> usize {
    (numleafs + 7) >> 3
}

/// Expands one compressed row into `out`. `out` must hold at least
/// `vis_row_bytes(numleafs)` bytes; anything past the row is untouched.
pub fn decompress_vis(visdata: &[u8], visofs: i32, numleafs: usize, out: &mut [u8]) {
    let row = vis_row_bytes(numleafs);

    if visofs < 0 || visdata.is_empty() {
        // no vis info, so make all visible
        out[..row].fill(0xff);
        return;
    }

    let mut inp = visofs as usize;
    let mut out_p = 0;

    while out_p < row {
        if inp >= visdata.len() {
            break;
        }
        if visdata[inp] != 0 {
            out[out_p] = visdata[inp];
            out_p += 1;
            inp += 1;
            continue;
        }

        if inp + 1 >= visdata.len() {
            break;
        }
        let mut c = visdata[inp + 1] as usize;
        inp += 2;
        if out_p + c > row {
            c = row - out_p;
            com_dprintf("warning: vis decompression overrun\n");
        }
        out[out_p..out_p + c].fill(0);
        out_p += c;
    }

    if out_p < row {
        // truncated input, keep the remainder deterministic
        com_dprintf("warning: vis data ends short of a full row\n");
        out[out_p..row].fill(0);
    }
}

impl LevelModel {
    /// Writes the decompressed visibility row for a leaf into `out`.
    /// The solid leaf (leaf 0) sees everything by convention.
    pub fn leaf_pvs(&self, leafnum: usize, out: &mut [u8]) {
        let row = vis_row_bytes(self.num_leafs());
        if leafnum == 0 {
            out[..row].fill(0xff);
            return;
        }
        let visofs = self.leafs[leafnum].visofs;
        decompress_vis(&self.visdata, visofs, self.num_leafs(), out);
    }
}

// ============================================================
// Tests
// ============================================================
