#[cfg(all(test, feature = "e2e-tests"))]
mod test {
    use std::time::Duration;

    use k8s_openapi::api::apps::v1::Deployment;
    use kube::api::{Api, Patch, PatchParams, PostParams};
    use kube::client::Client;
    use kube::runtime::wait::{await_condition, conditions, Condition};
    use kube::ResourceExt;
    use tokio::time::timeout;
    use whisk_operator::crd::whisk::{Components, Whisk, WhiskSpec};
    use whisk_operator::crd::whisk_user::{TenantCacheSpec, WhiskUser, WhiskUserSpec};

    fn is_component_state(component: &'static str, state: &'static str) -> impl Condition<Whisk> {
        move |obj: Option<&Whisk>| {
            obj.and_then(|whisk| whisk.status.as_ref())
                .and_then(|status| status.component_states.get(component))
                .map(|s| s == state)
                .unwrap_or(false)
        }
    }

    fn is_deployment_ready() -> impl Condition<Deployment> {
        |obj: Option<&Deployment>| {
            if let Some(deployment) = &obj {
                if let Some(status) = &deployment.status {
                    return status.replicas == status.updated_replicas
                        && status.replicas == status.ready_replicas;
                }
            }
            false
        }
    }

    fn is_subsystem_state(subsystem: &'static str, state: &'static str) -> impl Condition<WhiskUser> {
        move |obj: Option<&WhiskUser>| {
            obj.and_then(|user| user.status.as_ref())
                .and_then(|status| status.subsystems.get(subsystem))
                .map(|s| s == state)
                .unwrap_or(false)
        }
    }

    async fn wait_for<R, C>(api: Api<R>, name: &str, condition: C)
    where
        R: kube::Resource
            + Clone
            + std::fmt::Debug
            + for<'de> k8s_openapi::serde::Deserialize<'de>
            + 'static
            + Send,
        C: Condition<R>,
    {
        timeout(Duration::from_secs(30), await_condition(api, name, condition))
            .await
            .unwrap()
            .unwrap();
    }

    fn cache_only_whisk(name: &str) -> Whisk {
        Whisk::new(
            name,
            WhiskSpec {
                components: Components {
                    cache: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        )
    }

    async fn setup(name: &str) -> (Api<Whisk>, Api<Deployment>) {
        let whisk = cache_only_whisk(name);

        let client = Client::try_default().await.unwrap();
        let whisk_api = Api::<Whisk>::namespaced(client.clone(), "default");

        whisk_api.create(&PostParams::default(), &whisk).await.unwrap();

        let deployment_api = Api::<Deployment>::namespaced(client.clone(), "default");
        let deployment_name = format!("{name}-whisk-cache");
        wait_for(deployment_api.clone(), &deployment_name, is_deployment_ready()).await;
        wait_for(whisk_api.clone(), name, is_component_state("cache", "on")).await;
        (whisk_api, deployment_api)
    }

    #[tokio::test]
    async fn whisk_create_enables_cache() {
        let name = "test-whisk-create";
        setup(name).await;
    }

    #[tokio::test]
    async fn whisk_disable_component_tears_down_deployment() {
        let name = "test-whisk-disable-component";
        let (whisk_api, deployment_api) = setup(name).await;

        let mut whisk = whisk_api.get(name).await.unwrap();
        whisk.spec.components.cache = false;
        whisk.metadata.managed_fields = None;
        whisk_api
            .patch(name, &PatchParams::apply("e2e-tests").force(), &Patch::Apply(&whisk))
            .await
            .unwrap();

        wait_for(whisk_api.clone(), name, is_component_state("cache", "off")).await;

        let deployment_name = format!("{name}-whisk-cache");
        let deploy = deployment_api.get(&deployment_name).await.unwrap();
        wait_for(
            deployment_api.clone(),
            &deployment_name,
            conditions::is_deleted(&deploy.uid().unwrap()),
        )
        .await;
    }

    #[tokio::test]
    async fn whisk_delete_cascades_to_components() {
        let name = "test-whisk-delete";
        let (whisk_api, deployment_api) = setup(name).await;

        let whisk = whisk_api.get(name).await.unwrap();
        let deployment_name = format!("{name}-whisk-cache");
        let deploy = deployment_api.get(&deployment_name).await.unwrap();

        whisk_api.delete(name, &Default::default()).await.unwrap();

        wait_for(whisk_api.clone(), name, conditions::is_deleted(&whisk.uid().unwrap())).await;
        wait_for(
            deployment_api,
            &deployment_name,
            conditions::is_deleted(&deploy.uid().unwrap()),
        )
        .await;
    }

    #[tokio::test]
    async fn whisk_user_provisions_redis_prefix() {
        let client = Client::try_default().await.unwrap();
        let whisk_user_api = Api::<WhiskUser>::namespaced(client.clone(), "default");

        let name = "test-whisk-user";
        let user = WhiskUser::new(
            name,
            WhiskUserSpec {
                namespace: "tenant-e2e-ns".to_owned(),
                auth: format!("9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d:{}", "a".repeat(64)),
                redis: Some(TenantCacheSpec {
                    enabled: true,
                    prefix: "tenant-e2e".to_owned(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );

        whisk_user_api.create(&PostParams::default(), &user).await.unwrap();
        wait_for(whisk_user_api.clone(), name, is_subsystem_state("redis", "on")).await;
    }
}
