use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tiny_fs::{DEFAULT_BLOCK_SIZE, ROOT_INODE};

#[derive(Parser)]
#[command(about = "Build and inspect tiny-fs images")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Format a new image and import every regular file of a host directory
    Pack {
        /// Host source directory
        #[arg(long, short)]
        source: PathBuf,

        /// Image file to create
        #[arg(long, short)]
        image: PathBuf,

        /// Disk size in MiB
        #[arg(long, default_value_t = 10)]
        size_mib: u64,

        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: u32,
    },

    /// List a directory
    Ls {
        #[arg(long, short)]
        image: PathBuf,

        /// Directory inode
        #[arg(long, default_value_t = ROOT_INODE)]
        inode: u32,
    },

    /// Write a file's contents to stdout
    Cat {
        #[arg(long, short)]
        image: PathBuf,

        #[arg(long)]
        inode: u32,
    },

    /// Print the directory tree
    Tree {
        #[arg(long, short)]
        image: PathBuf,
    },

    /// Report block and inode usage
    Df {
        #[arg(long, short)]
        image: PathBuf,
    },
}
