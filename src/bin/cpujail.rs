use anyhow::Result;

fn main() -> Result<()> {
    cpujail::cli::run()
}
