mod cli;

use std::io::{self, Write};

use clap::Parser;
use cli::{Cli, Command};
use tiny_fs::{FileSystem, FormatOptions, ROOT_INODE};
use tiny_fs_fuse::{pack_dir, render_listing, render_tree, render_usage};
use typed_bytesize::ByteSizeIec;

fn main() -> tiny_fs::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut stdout = io::stdout().lock();

    match cli.command {
        Command::Pack {
            source,
            image,
            size_mib,
            block_size,
        } => {
            writeln!(stdout, "source={source:?}\nimage={image:?}")?;
            let options = FormatOptions::new(ByteSizeIec::mib(size_mib).0, block_size);
            let mut fs = FileSystem::format(&image, &options)?;

            for packed in pack_dir(&mut fs, ROOT_INODE, &source)? {
                writeln!(
                    stdout,
                    "{}: inode {}, {} bytes",
                    packed.name, packed.inode, packed.size
                )?;
            }
            fs.close()?;
        }
        Command::Ls { image, inode } => {
            let fs = FileSystem::open(&image)?;
            stdout.write_all(render_listing(&fs, inode)?.as_bytes())?;
        }
        Command::Cat { image, inode } => {
            let fs = FileSystem::open(&image)?;
            io::copy(&mut fs.file_read(inode)?, &mut stdout)?;
        }
        Command::Tree { image } => {
            let fs = FileSystem::open(&image)?;
            stdout.write_all(render_tree(&fs, ROOT_INODE)?.as_bytes())?;
        }
        Command::Df { image } => {
            let fs = FileSystem::open(&image)?;
            stdout.write_all(render_usage(&fs.usage()?).as_bytes())?;
        }
    }

    Ok(())
}
