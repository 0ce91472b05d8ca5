use crate::common_io::*;
use std::io::Write;

/// Coordinate-format matrix read from a MatrixMarket file (0-based)
#[derive(Debug, Clone)]
pub struct MtxTriplets {
    pub nrow: usize,
    pub ncol: usize,
    pub triplets: Vec<(usize, usize, f32)>,
}

impl MtxTriplets {
    /// Swap rows and columns
    pub fn transpose(self) -> Self {
        MtxTriplets {
            nrow: self.ncol,
            ncol: self.nrow,
            triplets: self
                .triplets
                .into_iter()
                .map(|(i, j, x)| (j, i, x))
                .collect(),
        }
    }
}

/// Write the triplets into a MatrixMarket file with 1-based indices
/// * `triplets` - the triplets to write
/// * `nrow` - number of rows
/// * `ncol` - number of columns
/// * `mtx_file` - the output file (e.g., "matrix.mtx.gz")
pub fn write_mtx_triplets(
    triplets: &[(usize, usize, f32)],
    nrow: usize,
    ncol: usize,
    mtx_file: &str,
) -> anyhow::Result<()> {
    mkdir(mtx_file)?;
    let mut buf = open_buf_writer(mtx_file)?;

    writeln!(buf, "%%MatrixMarket matrix coordinate real general")?;
    writeln!(buf, "{}\t{}\t{}", nrow, ncol, triplets.len())?;

    for (row, col, val) in triplets {
        writeln!(buf, "{}\t{}\t{}", row + 1, col + 1, val)?;
    }

    buf.flush()?;
    Ok(())
}

/// Read a MatrixMarket coordinate file.
///
/// Both `real`/`integer` (three columns) and `pattern` (two columns,
/// value 1) entries are accepted. Indices are checked against the header.
///
/// * `mtx_file` - Path to the matrix market file (gzipped or not)
pub fn read_mtx_triplets(mtx_file: &str) -> anyhow::Result<MtxTriplets> {
    let lines = read_lines_of_words(mtx_file)?;

    let (hdr, data) = lines
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("empty mtx file: {}", mtx_file))?;

    if hdr.len() != 3 {
        anyhow::bail!("failed to parse mtx header in {}", mtx_file);
    }

    let nrow = hdr[0].parse::<usize>()?;
    let ncol = hdr[1].parse::<usize>()?;
    let nnz = hdr[2].parse::<usize>()?;

    let mut triplets = Vec::with_capacity(nnz);

    for (line_no, words) in data.iter().enumerate() {
        let (row, col, val) = match words.len() {
            2 => (words[0].parse::<usize>()?, words[1].parse::<usize>()?, 1_f32),
            3 => (
                words[0].parse::<usize>()?,
                words[1].parse::<usize>()?,
                words[2].parse::<f32>()?,
            ),
            _ => anyhow::bail!("malformed mtx entry at data line {}", line_no + 1),
        };

        if row < 1 || row > nrow || col < 1 || col > ncol {
            anyhow::bail!(
                "mtx entry ({}, {}) out of bounds for a {} x {} matrix",
                row,
                col,
                nrow,
                ncol
            );
        }

        triplets.push((row - 1, col - 1, val));
    }

    if triplets.len() != nnz {
        log::warn!(
            "{}: header says {} non-zero elements, found {}",
            mtx_file,
            nnz,
            triplets.len()
        );
    }

    Ok(MtxTriplets {
        nrow,
        ncol,
        triplets,
    })
}
