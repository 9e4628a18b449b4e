fn main() -> anyhow::Result<()> {
    session_timer_lib::run()
}
