fn main() -> anyhow::Result<()> {
    todlex::cli::run()
}
