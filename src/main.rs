fn main() -> anyhow::Result<()> {
    eyecare_lib::run()
}
