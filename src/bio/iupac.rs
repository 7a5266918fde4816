//! Residue normalization and complement tables.
//!
//! Two complement tables coexist: the IUPAC-aware one is used by default and
//! maps every ambiguity code to its complement class, the DNA-only one maps
//! anything outside `acgt` to `n`.

const fn build_iupac_complement() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let b = i as u8;
        table[i] = if b.is_ascii_alphabetic() { b'n' } else { b };
        i += 1;
    }

    let pairs: [(u8, u8); 14] = [
        (b'a', b't'),
        (b'c', b'g'),
        (b'g', b'c'),
        (b't', b'a'),
        (b'u', b'a'),
        (b'r', b'y'),
        (b'y', b'r'),
        (b'k', b'm'),
        (b'm', b'k'),
        (b's', b's'),
        (b'w', b'w'),
        (b'b', b'v'),
        (b'v', b'b'),
        (b'd', b'h'),
    ];
    let mut j = 0;
    while j < pairs.len() {
        let (from, to) = pairs[j];
        table[from as usize] = to;
        table[from.to_ascii_uppercase() as usize] = to.to_ascii_uppercase();
        j += 1;
    }
    table[b'h' as usize] = b'd';
    table[b'H' as usize] = b'D';
    table[b'n' as usize] = b'n';
    table[b'N' as usize] = b'N';
    table[b'[' as usize] = b']';
    table[b']' as usize] = b'[';
    table
}

const fn build_dna_complement() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let b = i as u8;
        table[i] = if b.is_ascii_alphabetic() { b'n' } else { b };
        i += 1;
    }
    table[b'a' as usize] = b't';
    table[b'c' as usize] = b'g';
    table[b'g' as usize] = b'c';
    table[b't' as usize] = b'a';
    table[b'A' as usize] = b'T';
    table[b'C' as usize] = b'G';
    table[b'G' as usize] = b'C';
    table[b'T' as usize] = b'A';
    table[b'N' as usize] = b'N';
    table
}

static IUPAC_COMPLEMENT: [u8; 256] = build_iupac_complement();
static DNA_COMPLEMENT: [u8; 256] = build_dna_complement();

/// IUPAC-aware complement of a single residue.
#[inline]
pub fn complement(residue: u8) -> u8 {
    IUPAC_COMPLEMENT[residue as usize]
}

/// DNA-only complement; ambiguity codes collapse to `n`.
#[inline]
pub fn complement_dna(residue: u8) -> u8 {
    DNA_COMPLEMENT[residue as usize]
}

pub fn reverse_complement(sequence: &[u8]) -> Vec<u8> {
    sequence.iter().rev().map(|&b| complement(b)).collect()
}

pub fn reverse_complement_dna(sequence: &[u8]) -> Vec<u8> {
    sequence.iter().rev().map(|&b| complement_dna(b)).collect()
}

/// Canonical residue form: lowercase letters, `-` and `.`.
/// Returns `None` for bytes that are not residues.
#[inline]
pub fn normalize_residue(b: u8) -> Option<u8> {
    match b {
        b'a'..=b'z' | b'-' | b'.' => Some(b),
        b'A'..=b'Z' => Some(b.to_ascii_lowercase()),
        _ => None,
    }
}

/// Lowercases ASCII letters in place (I3). Other bytes are left untouched.
pub fn lowercase_in_place(sequence: &mut [u8]) {
    sequence.make_ascii_lowercase();
}

/// 2-bit nucleotide code: a→0, c→1, g→2, t/u→3.
#[inline]
pub fn nucleotide_code(b: u8) -> Option<u8> {
    match b {
        b'a' | b'A' => Some(0),
        b'c' | b'C' => Some(1),
        b'g' | b'G' => Some(2),
        b't' | b'T' | b'u' | b'U' => Some(3),
        _ => None,
    }
}

#[inline]
pub fn code_nucleotide(code: u8) -> u8 {
    b"acgt"[(code & 3) as usize]
}

/// Bit mask of the nucleotides an IUPAC symbol stands for (a=1, c=2, g=4, t=8).
#[inline]
pub fn iupac_mask(b: u8) -> u8 {
    match b.to_ascii_lowercase() {
        b'a' => 0b0001,
        b'c' => 0b0010,
        b'g' => 0b0100,
        b't' | b'u' => 0b1000,
        b'r' => 0b0101,
        b'y' => 0b1010,
        b's' => 0b0110,
        b'w' => 0b1001,
        b'k' => 0b1100,
        b'm' => 0b0011,
        b'b' => 0b1110,
        b'd' => 0b1101,
        b'h' => 0b1011,
        b'v' => 0b0111,
        b'n' => 0b1111,
        _ => 0,
    }
}

/// True when two residues may denote the same nucleotide.
#[inline]
pub fn iupac_match(a: u8, b: u8) -> bool {
    iupac_mask(a) & iupac_mask(b) != 0
}
