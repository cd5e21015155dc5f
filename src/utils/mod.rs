pub mod contig;
