use criterion::{criterion_group, criterion_main, Criterion};
use corvid::Corvid;

fn fibonacci() {
    let src = r#"
        fun fib(n) {
            if n < 2 { return n; }
            return fib(n - 2) + fib(n - 1);
        }

        fib(20);
    "#;

    let mut corvid = Corvid::new();
    corvid.run(src).unwrap();
}

fn zoo() {
    let src = r#"
        class Zoo {
            fun init(self) {
                self.aardvark = 1;
                self.baboon   = 1;
                self.cat      = 1;
                self.donkey   = 1;
                self.elephant = 1;
                self.fox      = 1;
            }
            fun ant(self)    { return self.aardvark; }
            fun banana(self) { return self.baboon; }
            fun tuna(self)   { return self.cat; }
            fun hay(self)    { return self.donkey; }
            fun grass(self)  { return self.elephant; }
            fun mouse(self)  { return self.fox; }
        }

        zoo = Zoo();
        sum = 0;
        while sum < 100000 {
            sum = sum + zoo.ant()
                + zoo.banana()
                + zoo.tuna()
                + zoo.hay()
                + zoo.grass()
                + zoo.mouse();
        }
    "#;

    let mut corvid = Corvid::new();
    corvid.run(src).unwrap();
}

fn vectors() {
    let src = r#"
        struct Vec2 {
            fun init(self, x, y) { self.x = x; self.y = y; }
            operator +(self: Vec2, other: Vec2) -> Vec2 { return Vec2(self.x + other.x, self.y + other.y); }
        }

        acc = Vec2(0, 0);
        step = Vec2(1, 2);
        for i in 0..5000 {
            acc = acc + step;
        }
    "#;

    let mut corvid = Corvid::new();
    corvid.run(src).unwrap();
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("my-benchmark");
    group.sample_size(20);
    group.bench_function("fib 20", |b| b.iter(fibonacci));
    group.bench_function("zoo", |b| b.iter(zoo));
    group.bench_function("vectors", |b| b.iter(vectors));
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
