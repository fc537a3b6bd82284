mod cli;
mod core;

fn main() -> anyhow::Result<std::process::ExitCode> {
  cli::main()
}
