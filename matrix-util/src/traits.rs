/// Convert to and from the vector of non-zero triplets
pub trait MatTriplets {
    type Mat;
    type Scalar;

    fn from_nonzero_triplets(
        nrow: usize,
        ncol: usize,
        triplets: Vec<(usize, usize, Self::Scalar)>,
    ) -> anyhow::Result<Self::Mat>;

    /// Returns `(nrow, ncol, triplets)`, triplets in `(row, col, value)`
    fn to_nonzero_triplets(
        &self,
    ) -> anyhow::Result<(usize, usize, Vec<(usize, usize, Self::Scalar)>)>;
}

/// Read and write matrices from and to delimited text files
pub trait IoOps {
    type Scalar;
    type Mat;

    fn read_file_delim(file: &str, delim: &str, skip: Option<usize>)
        -> anyhow::Result<Self::Mat>;

    fn from_tsv(tsv_file: &str, skip: Option<usize>) -> anyhow::Result<Self::Mat> {
        Self::read_file_delim(tsv_file, "\t", skip)
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()>;

    /// Write with a header line of column names and a leading row-name column
    fn write_file_delim_with_names(
        &self,
        file: &str,
        delim: &str,
        row_names: &[Box<str>],
        column_names: &[Box<str>],
    ) -> anyhow::Result<()>;

    fn to_tsv(&self, tsv_file: &str) -> anyhow::Result<()> {
        self.write_file_delim(tsv_file, "\t")
    }

    fn to_tsv_with_names(
        &self,
        tsv_file: &str,
        row_names: &[Box<str>],
        column_names: &[Box<str>],
    ) -> anyhow::Result<()> {
        self.write_file_delim_with_names(tsv_file, "\t", row_names, column_names)
    }
}
