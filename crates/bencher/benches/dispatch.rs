use bencher::{TestCase, TestGroup, TestRequest};
use bytes::Bytes;
use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use micro_chain::{Application, RouterOptions, done, handler_fn, next};
use std::hint::black_box;

static FIRST_ROUTE: TestRequest = TestRequest::get("/");
static LAST_ROUTE: TestRequest = TestRequest::get("/resources/19/7");
static MOUNTED_ROUTE: TestRequest = TestRequest::get("/api/v1/orgs/acme/users/42");
static NOT_FOUND: TestRequest = TestRequest::get("/does/not/exist");
static MALFORMED_PARAM: TestRequest = TestRequest::get("/resources/%FF/1");

fn create_test_cases() -> Vec<TestCase> {
    vec![
        TestCase::small("first_route", FIRST_ROUTE),
        TestCase::normal("last_route", LAST_ROUTE),
        TestCase::large("mounted_route", MOUNTED_ROUTE),
        TestCase::normal("not_found", NOT_FOUND),
        TestCase::normal("malformed_param", MALFORMED_PARAM),
    ]
}

fn create_application() -> Application {
    let app = Application::new();
    app.set(micro_chain::keys::ENV, "test");

    app.middleware(handler_fn(|_req, _res| Box::pin(async { next() }))).unwrap();
    app.get(
        "/",
        handler_fn(|_req, res| {
            Box::pin(async move {
                res.send("home")?;
                done()
            })
        }),
    )
    .unwrap();

    for i in 0..20 {
        app.get(
            &format!("/resources/{i}/:id"),
            handler_fn(|req, res| {
                Box::pin(async move {
                    let id = req.param("id").unwrap_or_default().to_owned();
                    res.send(id)?;
                    done()
                })
            }),
        )
        .unwrap();
    }

    let users = micro_chain::Router::with_options(RouterOptions::default().merge_params(true));
    users
        .get(
            "/users/:id",
            handler_fn(|req, res| {
                Box::pin(async move {
                    let body = format!("{}:{}", req.param("org").unwrap_or_default(), req.param("id").unwrap_or_default());
                    res.send(body)?;
                    done()
                })
            }),
        )
        .unwrap();
    let api = app.new_router();
    api.mount("/orgs/:org", &users).unwrap();
    app.mount("/api/v1", &api).unwrap();

    app
}

fn benchmark_dispatch(criterion: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread().build().expect("runtime should build");
    let app = create_application();
    let test_cases = create_test_cases();

    for test_group in TestGroup::ALL {
        let mut group = criterion.benchmark_group(format!("dispatch/{}", test_group.name()));

        for case in test_cases.iter().filter(|case| case.group() == test_group) {
            group.bench_with_input(BenchmarkId::from_parameter(case.name()), case, |b, case| {
                b.iter_batched(
                    || {
                        http::Request::builder()
                            .method(case.request().method())
                            .uri(case.uri())
                            .body(Bytes::new())
                            .expect("test request should be valid")
                    },
                    |request| black_box(runtime.block_on(app.handle(request))),
                    BatchSize::SmallInput,
                );
            });
        }

        group.finish();
    }
}

criterion_group!(dispatch, benchmark_dispatch);
criterion_main!(dispatch);
