fn main() {
    character_hunter_lib::run()
}
